//! Connection lifecycle: configuration, authentication, and event dispatch
//!
//! A `ConnectionCore` is everything tied to one SIP account: its static
//! configuration, the REGISTER state machine and authentication ledger, and
//! the `MediaChannelFactory` that owns every call on the account.

pub mod auth;
pub mod builder;
pub mod config;
pub mod core;
pub mod events;
pub mod helpers;

pub use auth::{AuthState, ChallengeOutcome};
pub use builder::ConnectionBuilder;
pub use config::{AuxCredentials, ConnectionConfig, KeepaliveMechanism, TransportPreference};
pub use core::{ConnectionCore, ConnectionStatus};
pub use events::{EventSink, NullEventSink};
pub use helpers::{KeepaliveScheduler, KeepaliveSink, StunBinding};
