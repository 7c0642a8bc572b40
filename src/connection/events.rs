//! Published-interface event broadcasts
//!
//! Mirrors `ClientEventHandler` in the teacher crate: one async trait with
//! default no-op methods, so an embedder overrides only the broadcasts it
//! cares about. These correspond to the "NewChannel"/"NewStream"/"Closed"
//! signals a published object model would emit.

use async_trait::async_trait;

/// Sink for entity-lifecycle broadcasts raised by channels, sessions, and streams.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// A new `MediaChannel` was minted at `object_path`.
    async fn channel_created(&self, _object_path: &str) {}

    /// A new `MediaStream` was created at ordinal `stream_index` within the
    /// session owned by the channel at `channel_path`.
    async fn stream_created(&self, _channel_path: &str, _stream_index: usize) {}

    /// The entity at `object_path` was destroyed (channel closed, session ended).
    async fn closed(&self, _object_path: &str) {}
}

/// An `EventSink` that discards every broadcast, for tests and for
/// connections that don't need to observe lifecycle events.
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {}
