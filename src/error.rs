//! Error types for the SIP call-control core
//!
//! This module defines every error condition the core can surface, organized
//! by the propagation policy in the design: connection-scoped errors end the
//! connection (which in turn closes every channel), channel-scoped errors
//! end only that channel, and protocol-parsing errors reject a single
//! dialog without touching any other.
//!
//! # Examples
//!
//! ```rust
//! use sip_callcore::error::Error;
//!
//! let err = Error::AuthFailed { reason: "credentials rejected twice".into() };
//! assert!(err.is_connection_fatal());
//! assert_eq!(err.category(), "auth");
//! ```

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All error conditions the call-control core can produce.
///
/// Each variant maps to one of the error kinds in the design: `AuthFailed`
/// and `NetworkError` are connection-scoped and terminal for the
/// `ConnectionCore`; `InvalidHandle`, `InvalidArgument`, `RemotePeerError`,
/// `LocalTimeout`, and `MediaUnsupported` are channel-scoped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Credentials were rejected after loop detection, or REGISTER answered 403.
    ///
    /// Terminal for the connection: the caller should transition to
    /// `DISCONNECTED` and close every channel.
    #[error("authentication failed: {reason}")]
    AuthFailed {
        /// Human-readable reason, usually derived from the challenge response.
        reason: String,
    },

    /// REGISTER answered >=300 other than 403, or the transport failed.
    ///
    /// Terminal for the connection, same as `AuthFailed`.
    #[error("network error: {reason}")]
    NetworkError {
        /// Description of the transport or protocol failure.
        reason: String,
    },

    /// A request named a handle the repository rejects, or a self-call was attempted.
    #[error("invalid handle: {reason}")]
    InvalidHandle {
        /// Why the handle was rejected.
        reason: String,
    },

    /// A request asked for an unsupported channel type, or carried malformed SDP.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument was rejected.
        reason: String,
    },

    /// The peer rejected or errored an INVITE (status >= 300).
    #[error("remote peer error {status}: {phrase}")]
    RemotePeerError {
        /// SIP status code returned by the peer.
        status: u16,
        /// SIP reason phrase returned by the peer.
        phrase: String,
    },

    /// A `MediaSession` stayed in `PENDING_INITIATED` longer than the 50s timeout.
    #[error("session timed out waiting for the offer/answer handshake")]
    LocalTimeout,

    /// Remote SDP contained no audio or video m-line.
    #[error("remote SDP offered no supported media")]
    MediaUnsupported,

    /// The requested channel type is not implemented by the factory.
    #[error("channel type not implemented")]
    NotImplemented,
}

impl Error {
    /// Connection-scoped errors that must terminate the whole connection.
    ///
    /// ```rust
    /// use sip_callcore::error::Error;
    /// assert!(Error::NetworkError { reason: "timeout".into() }.is_connection_fatal());
    /// assert!(!Error::LocalTimeout.is_connection_fatal());
    /// ```
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Error::AuthFailed { .. } | Error::NetworkError { .. })
    }

    /// Channel-scoped errors that terminate only the affected channel.
    pub fn is_channel_fatal(&self) -> bool {
        matches!(
            self,
            Error::RemotePeerError { .. } | Error::LocalTimeout | Error::MediaUnsupported
        )
    }

    /// Category label, used for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Error::AuthFailed { .. } => "auth",
            Error::NetworkError { .. } => "network",
            Error::InvalidHandle { .. } => "handle",
            Error::InvalidArgument { .. } => "argument",
            Error::RemotePeerError { .. } => "peer",
            Error::LocalTimeout => "timeout",
            Error::MediaUnsupported => "media",
            Error::NotImplemented => "unimplemented",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_fatal_matches_design_taxonomy() {
        assert!(Error::AuthFailed { reason: "x".into() }.is_connection_fatal());
        assert!(Error::NetworkError { reason: "x".into() }.is_connection_fatal());
        assert!(!Error::InvalidHandle { reason: "x".into() }.is_connection_fatal());
    }

    #[test]
    fn channel_fatal_matches_design_taxonomy() {
        assert!(Error::RemotePeerError { status: 486, phrase: "Busy Here".into() }.is_channel_fatal());
        assert!(Error::LocalTimeout.is_channel_fatal());
        assert!(Error::MediaUnsupported.is_channel_fatal());
        assert!(!Error::AuthFailed { reason: "x".into() }.is_channel_fatal());
    }

    #[test]
    fn categories_are_stable() {
        assert_eq!(Error::AuthFailed { reason: "x".into() }.category(), "auth");
        assert_eq!(Error::RemotePeerError { status: 486, phrase: "Busy Here".into() }.category(), "peer");
    }
}
