//! Media channel / session / stream triad and its SDP offer/answer state machine.

pub mod channel;
pub mod factory;
pub mod sdp;
pub mod session;
pub mod stream;

pub use channel::{MediaChannel, NatTraversal};
pub use factory::{ChannelType, HandleType, MediaChannelFactory, RequestOutcome};
pub use session::{MediaSession, SessionObserver, SessionState};
pub use stream::{Candidate, Codec, MediaEngineEvent, MediaEngineHandle, MediaKind, MediaStream};
