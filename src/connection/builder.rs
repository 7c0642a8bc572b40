//! Fluent builder for `ConnectionCore`
//!
//! Mirrors `ClientBuilder` in the teacher crate: a chainable interface over
//! `ConnectionConfig`, plus the external collaborators (`SipTransport`,
//! `EventSink`) a `ConnectionCore` needs but can't default-construct.

use crate::connection::config::{ConnectionConfig, KeepaliveMechanism, TransportPreference};
use crate::connection::core::ConnectionCore;
use crate::connection::events::{EventSink, NullEventSink};
use crate::error::{Error, Result};
use crate::sip::SipTransport;
use std::sync::Arc;

/// Builds a `ConnectionCore` from a `ConnectionConfig` plus its external
/// collaborators. `sip` is required; `events` defaults to a no-op sink.
pub struct ConnectionBuilder {
    config: ConnectionConfig,
    sip: Option<Arc<dyn SipTransport>>,
    events: Arc<dyn EventSink>,
}

impl ConnectionBuilder {
    pub fn new(account_uri: impl Into<String>) -> Self {
        Self {
            config: ConnectionConfig::new(account_uri),
            sip: None,
            events: Arc::new(NullEventSink),
        }
    }

    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registrar(mut self, registrar_uri: impl Into<String>) -> Self {
        self.config = self.config.with_registrar(registrar_uri);
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.config = self.config.with_password(password);
        self
    }

    pub fn with_keepalive(mut self, mechanism: KeepaliveMechanism, interval_secs: u64) -> Self {
        self.config = self.config.with_keepalive(mechanism).with_keepalive_interval_secs(interval_secs);
        self
    }

    pub fn with_transport(mut self, transport: TransportPreference) -> Self {
        self.config = self.config.with_transport(transport);
        self
    }

    pub fn with_sip_transport(mut self, sip: Arc<dyn SipTransport>) -> Self {
        self.sip = Some(sip);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Construct the `ConnectionCore`. Fails if no `SipTransport` was provided.
    pub async fn build(self) -> Result<ConnectionCore> {
        let sip = self.sip.ok_or_else(|| Error::InvalidArgument { reason: "no SIP transport configured".into() })?;
        Ok(ConnectionCore::new(self.config, sip, self.events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sip::mock::MockTransport;

    #[tokio::test]
    async fn build_without_transport_fails() {
        let result = ConnectionBuilder::new("sip:bob@example.com").build().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn build_with_transport_succeeds() {
        let sip = Arc::new(MockTransport::new());
        let core = ConnectionBuilder::new("sip:bob@example.com")
            .with_registrar("sip:registrar.example.com")
            .with_password("secret")
            .with_sip_transport(sip)
            .build()
            .await
            .unwrap();
        assert_eq!(core.config.account_uri, "sip:bob@example.com");
    }
}
