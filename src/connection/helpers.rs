//! URL normalization, Contact feature tagging, STUN plumbing, keepalive tuning
//!
//! The grab-bag module: everything ConnectionCore needs that isn't itself
//! REGISTER/auth/dispatch logic.

use crate::connection::config::{ConnectionConfig, KeepaliveMechanism};
use crate::media::session::MediaSession;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Ensure a URI carries a `sip:` scheme; pass through URIs that already do
/// (including `sips:`).
pub fn normalize_uri(uri: &str) -> String {
    if uri.starts_with("sip:") || uri.starts_with("sips:") {
        uri.to_string()
    } else {
        format!("sip:{}", uri)
    }
}

/// Attach feature tags (`audio`, `video`) to a Contact URI, as computed from
/// a session's active stream set. An empty feature list leaves the URI
/// untouched.
pub fn build_contact_uri(account_uri: &str, features: &[&'static str]) -> String {
    if features.is_empty() {
        normalize_uri(account_uri)
    } else {
        format!("{};{}", normalize_uri(account_uri), features.join(";"))
    }
}

/// Convenience wrapper: build the Contact URI a REGISTER refresh should
/// carry, reflecting whichever session is most representative of the
/// connection's current media capability (callers typically pass the most
/// recently established session, if any).
pub fn contact_uri_for_session(account_uri: &str, session: Option<&MediaSession>) -> String {
    match session {
        Some(session) => build_contact_uri(account_uri, &session.contact_features()),
        None => normalize_uri(account_uri),
    }
}

/// Resolved STUN binding, plumbed through from configuration without any
/// discovery logic of our own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunBinding {
    pub host: String,
    pub port: u16,
}

pub fn resolve_stun(config: &ConnectionConfig) -> Option<StunBinding> {
    config.stun_host.as_ref().map(|host| StunBinding { host: host.clone(), port: config.stun_port })
}

/// Destination for a periodic application-level keepalive nudge.
#[async_trait]
pub trait KeepaliveSink: Send + Sync {
    async fn send_keepalive(&self);
}

/// Arms/cancels the periodic keepalive timer for a connection. A no-op
/// unless the configured mechanism is `ApplicationLevel`.
pub struct KeepaliveScheduler {
    task: Option<tokio::task::JoinHandle<()>>,
}

impl KeepaliveScheduler {
    pub fn new() -> Self {
        Self { task: None }
    }

    pub fn arm(&mut self, mechanism: KeepaliveMechanism, interval: Duration, sink: Arc<dyn KeepaliveSink>) {
        self.cancel();
        if mechanism != KeepaliveMechanism::ApplicationLevel {
            return;
        }
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                sink.send_keepalive().await;
            }
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }
}

impl Default for KeepaliveScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KeepaliveScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
