//! Connection configuration
//!
//! `ConnectionConfig` captures everything about a SIP account that's known
//! before bring-up. Learned state (registrar realm, registration-succeeded
//! flag, last-sent auth token) lives on `ConnectionCore` instead, since it
//! changes over the connection's lifetime rather than being configured.
//!
//! # Examples
//!
//! ```rust
//! use sip_callcore::connection::config::{ConnectionConfig, TransportPreference};
//!
//! let config = ConnectionConfig::new("sip:bob@example.com")
//!     .with_registrar("sip:registrar.example.com")
//!     .with_password("secret")
//!     .with_keepalive_interval_secs(30)
//!     .with_transport(TransportPreference::Udp);
//!
//! assert_eq!(config.account_uri, "sip:bob@example.com");
//! assert_eq!(config.keepalive_interval_secs, 30);
//! ```

use serde::{Deserialize, Serialize};

/// Preferred SIP transport. The underlying stack may still fall back per
/// its own rules (e.g. to TCP for oversized messages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportPreference {
    Udp,
    Tcp,
    Tls,
}

impl Default for TransportPreference {
    fn default() -> Self {
        TransportPreference::Udp
    }
}

/// How (and whether) the connection nudges an idle dialog to keep NAT
/// bindings alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeepaliveMechanism {
    /// No application-level keepalive; rely on the transport/registration refresh alone.
    None,
    /// Periodically re-send an empty-body in-dialog request.
    ApplicationLevel,
}

impl Default for KeepaliveMechanism {
    fn default() -> Self {
        KeepaliveMechanism::None
    }
}

/// Auxiliary (non-home-realm) credentials, used for challenges issued by
/// proxies other than the registrar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxCredentials {
    pub user: String,
    pub password: String,
}

/// Static configuration for one `ConnectionCore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub account_uri: String,
    pub proxy_uri: Option<String>,
    pub registrar_uri: String,
    pub password: String,
    pub aux_credentials: Option<AuxCredentials>,
    pub stun_host: Option<String>,
    pub stun_port: u16,
    pub keepalive_mechanism: KeepaliveMechanism,
    pub keepalive_interval_secs: u64,
    pub tolerate_tls_errors: bool,
    pub transport: TransportPreference,
    pub register_expires_secs: u32,
}

impl ConnectionConfig {
    /// A config with just an account URI; every other field takes its
    /// default (registrar is the account's own URI, no STUN, no keepalive).
    pub fn new(account_uri: impl Into<String>) -> Self {
        let account_uri = account_uri.into();
        Self {
            registrar_uri: account_uri.clone(),
            account_uri,
            proxy_uri: None,
            password: String::new(),
            aux_credentials: None,
            stun_host: None,
            stun_port: 3478,
            keepalive_mechanism: KeepaliveMechanism::default(),
            keepalive_interval_secs: 30,
            tolerate_tls_errors: false,
            transport: TransportPreference::default(),
            register_expires_secs: 3600,
        }
    }

    pub fn with_registrar(mut self, registrar_uri: impl Into<String>) -> Self {
        self.registrar_uri = registrar_uri.into();
        self
    }

    pub fn with_proxy(mut self, proxy_uri: impl Into<String>) -> Self {
        self.proxy_uri = Some(proxy_uri.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_aux_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.aux_credentials = Some(AuxCredentials { user: user.into(), password: password.into() });
        self
    }

    pub fn with_stun(mut self, host: impl Into<String>, port: u16) -> Self {
        self.stun_host = Some(host.into());
        self.stun_port = port;
        self
    }

    pub fn with_keepalive(mut self, mechanism: KeepaliveMechanism) -> Self {
        self.keepalive_mechanism = mechanism;
        self
    }

    pub fn with_keepalive_interval_secs(mut self, secs: u64) -> Self {
        self.keepalive_interval_secs = secs;
        self
    }

    pub fn with_transport(mut self, transport: TransportPreference) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_tls_error_tolerance(mut self, tolerate: bool) -> Self {
        self.tolerate_tls_errors = tolerate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_registrar_to_account_uri() {
        let config = ConnectionConfig::new("sip:bob@example.com");
        assert_eq!(config.registrar_uri, "sip:bob@example.com");
        assert_eq!(config.keepalive_mechanism, KeepaliveMechanism::None);
    }

    #[test]
    fn builder_methods_compose() {
        let config = ConnectionConfig::new("sip:bob@example.com")
            .with_registrar("sip:registrar.example.com")
            .with_aux_credentials("relay-user", "relay-pass")
            .with_stun("stun.example.com", 3478);

        assert_eq!(config.registrar_uri, "sip:registrar.example.com");
        assert_eq!(config.aux_credentials.as_ref().unwrap().user, "relay-user");
        assert_eq!(config.stun_host.as_deref(), Some("stun.example.com"));
    }
}
