//! SIP transaction stack boundary
//!
//! The call-control core does not implement the SIP transport or transaction
//! layer itself — per the design, that stack is "assumed available as a
//! library" and consumed through the traits below. An embedder wires a real
//! stack (sofia-sip, an ezk `sip-core`/`sip-ua` pair, or similar) in by
//! implementing [`SipTransport`]; the `mock` submodule below implements it
//! in-memory for the crate's own tests.
//!
//! Inbound traffic from the stack arrives as one tagged [`SipEvent`] per
//! Design Notes §9 ("a tagged variant with a payload per kind"), replacing
//! the monolithic integer-event-code switch of the system this core was
//! modeled on.

use async_trait::async_trait;

/// Opaque reference to a SIP dialog or transaction, minted by the stack.
///
/// Two dialog handles are never equal unless they refer to the same
/// transaction/dialog; beyond that, the core treats this as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DialogHandle(pub u64);

/// A WWW-Authenticate or Proxy-Authenticate challenge, as presented by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Authentication scheme, e.g. `"Digest"`.
    pub scheme: String,
    /// The `realm=` parameter, unquoted.
    pub realm: Option<String>,
}

/// One inbound event from the SIP stack.
///
/// This is the typed replacement for the tag-list/event-kind pair a C NUA
/// callback would hand over; `ConnectionCore::dispatch` matches on it
/// directly instead of switching on an integer code.
#[derive(Debug, Clone, PartialEq)]
pub enum SipEvent {
    /// The stack has finished shutting down (`r_shutdown`, status >= 200).
    RShutdown,
    /// Response to an outbound REGISTER.
    RRegister {
        status: u16,
        phrase: String,
        challenge: Option<Challenge>,
    },
    /// Response to an outbound un-REGISTER (Expires: 0).
    RUnregister { status: u16, phrase: String },
    /// Response to an outbound INVITE.
    RInvite {
        dialog: DialogHandle,
        status: u16,
        phrase: String,
        challenge: Option<Challenge>,
        remote_sdp: Option<String>,
    },
    /// An inbound INVITE (initial or re-INVITE).
    IInvite {
        dialog: DialogHandle,
        from_uri: String,
        sdp: Option<String>,
    },
    /// A dialog state change, e.g. BYE or remote SDP becoming available mid-call.
    IState {
        dialog: DialogHandle,
        remote_sdp: Option<String>,
        terminated: bool,
    },
    /// An inbound MESSAGE (text channel path; decoded by the embedder before
    /// this event is constructed — see `spec.md` §4.4).
    IMessage {
        dialog: DialogHandle,
        from_uri: String,
        body: String,
    },
    /// Response to an outbound MESSAGE.
    RMessage { status: u16, phrase: String },
    /// Any other event kind the stack produced, carrying only a dialog
    /// handle and whether that handle is known-expired.
    Unknown { dialog: DialogHandle, expired: bool },
}

/// Preference for which candidate pairs the media engine should consider
/// when ordering ICE candidates in an outbound offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSortingPreference {
    /// Prefer candidates the remote peer has already nominated.
    Remote,
}

/// Preference for which candidates to attach to the outbound SDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSelectionPreference {
    /// Attach every gathered candidate.
    All,
}

/// Capabilities consumed from the SIP transaction stack.
///
/// One instance is owned per `ConnectionCore`.
#[async_trait]
pub trait SipTransport: Send + Sync {
    /// Create a dialog handle bound to a peer URI, for an outbound request.
    async fn create_dialog(&self, peer_uri: &str) -> DialogHandle;

    /// Send an INVITE on a (possibly freshly created) dialog, carrying `sdp`.
    async fn send_invite(
        &self,
        dialog: DialogHandle,
        sdp: &str,
        sorting: CandidateSortingPreference,
        selection: CandidateSelectionPreference,
    );

    /// Send a BYE on an established dialog.
    async fn send_bye(&self, dialog: DialogHandle);

    /// Send a REGISTER to the registrar.
    async fn send_register(&self, registrar_uri: &str, contact_uri: &str, expires: u32);

    /// Send an outbound text MESSAGE.
    async fn send_message(&self, peer_uri: &str, body: &str);

    /// Respond to an existing dialog/transaction with a status and optional SDP body.
    async fn respond(&self, dialog: DialogHandle, status: u16, phrase: &str, sdp: Option<&str>);

    /// Submit the next authentication response for a challenged transaction.
    async fn authenticate(&self, dialog: DialogHandle, auth_token: &str);

    /// Destroy a dialog handle, reclaiming stack-side resources.
    async fn destroy_dialog(&self, dialog: DialogHandle);

    /// Shut down the stack instance entirely (connection tear-down).
    async fn shutdown(&self);
}
