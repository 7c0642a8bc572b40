//! SIP call-control core
//!
//! A SIP (RFC 3261) connection manager that exposes voice/video call
//! sessions to a higher-level real-time communications framework. A client
//! creates a [`connection::ConnectionCore`] against a SIP account, then
//! requests or receives [`media::MediaChannel`]s — stateful conversation
//! objects driven through SIP dialogs, authentication, registration, and
//! SDP (RFC 4566) offer/answer exchange.
//!
//! This crate does not itself transport RTP media, parse SIP messages, or
//! implement the SIP transaction layer: those are delegated to external
//! collaborators reached through the [`sip::SipTransport`] and
//! [`media::MediaEngineHandle`] trait boundaries. An embedder wires in a
//! real SIP stack and media engine; the crate's own test suite exercises
//! the state machines against the in-memory mocks under each module's
//! `#[cfg(test)]`.
//!
//! # Layout
//!
//! - [`error`] — the error taxonomy and its connection/channel-fatal split.
//! - [`handle`] — the URI<->[`handle::ContactHandle`] repository.
//! - [`sip`] — the SIP transport boundary (`SipEvent`, `SipTransport`).
//! - [`media`] — streams, sessions, channels, and the channel factory.
//! - [`connection`] — configuration, authentication, and event dispatch.

pub mod connection;
pub mod error;
pub mod handle;
pub mod media;
pub mod sip;

pub use connection::{ConnectionBuilder, ConnectionConfig, ConnectionCore, ConnectionStatus};
pub use error::{Error, Result};
pub use handle::{ContactHandle, HandleRepository, NO_HANDLE};
pub use media::{ChannelType, HandleType, MediaChannel, MediaChannelFactory, MediaSession, RequestOutcome};
pub use sip::{Challenge, DialogHandle, SipEvent, SipTransport};
