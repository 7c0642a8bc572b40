//! `MediaChannel` — call-control façade
//!
//! Translates member actions (add a peer, accept, reject, close) into
//! `MediaSession` actions, and binds the SIP dialog handle that identifies
//! this call on the wire. A channel owns exactly one session for its whole
//! lifetime; once closed it emits no further events, even if stray SIP
//! traffic for its dialog keeps arriving (the factory's expired-dialog set
//! is what actually stops that traffic reaching here at all).

use crate::connection::events::EventSink;
use crate::error::{Error, Result};
use crate::handle::{ContactHandle, HandleRepository, NO_HANDLE};
use crate::media::session::{MediaSession, SessionObserver, SessionState};
use crate::media::stream::{MediaEngineEvent, MediaEngineHandle, MediaKind, MediaStream};
use crate::sip::{DialogHandle, SipTransport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// NAT traversal descriptor attached to a channel at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NatTraversal {
    None,
    Stun { server: String, port: u16 },
}

impl Default for NatTraversal {
    fn default() -> Self {
        NatTraversal::None
    }
}

/// A state-change notification forwarded from the owned `MediaSession`,
/// queued rather than delivered through a back-pointer — see the session
/// module's `SessionObserver` doc for why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelSignal {
    SessionStateChanged(SessionState),
    SessionTerminated,
}

struct ChannelSessionObserver {
    signals: Arc<Mutex<VecDeque<ChannelSignal>>>,
}

#[async_trait]
impl SessionObserver for ChannelSessionObserver {
    async fn on_state_changed(&self, state: SessionState) {
        self.signals.lock().unwrap().push_back(ChannelSignal::SessionStateChanged(state));
    }

    async fn on_terminated(&self) {
        self.signals.lock().unwrap().push_back(ChannelSignal::SessionTerminated);
    }
}

/// Call-control façade binding one SIP dialog to one `MediaSession`.
pub struct MediaChannel {
    pub object_path: String,
    pub creator: ContactHandle,
    pub self_handle: ContactHandle,
    pub peer: ContactHandle,
    pub dialog: Option<DialogHandle>,
    pub session: MediaSession,
    pub members_current: Vec<ContactHandle>,
    pub members_local_pending: Vec<ContactHandle>,
    pub members_remote_pending: Vec<ContactHandle>,
    pub nat: NatTraversal,
    pub closed: bool,

    signals: Arc<Mutex<VecDeque<ChannelSignal>>>,
    sip: Arc<dyn SipTransport>,
    handles: Arc<HandleRepository>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for MediaChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaChannel")
            .field("object_path", &self.object_path)
            .field("peer", &self.peer)
            .field("closed", &self.closed)
            .field("session_state", &self.session.state)
            .finish()
    }
}

impl MediaChannel {
    /// Mint a fresh, empty channel: no peer yet, no dialog bound. The
    /// caller (factory) must immediately follow with either `add_member`
    /// (outgoing request) or `receive_invite` (inbound INVITE).
    pub fn new(
        object_path: String,
        self_handle: ContactHandle,
        session_id: u32,
        sip: Arc<dyn SipTransport>,
        handles: Arc<HandleRepository>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let signals = Arc::new(Mutex::new(VecDeque::new()));
        let observer: Arc<dyn SessionObserver> = Arc::new(ChannelSessionObserver { signals: signals.clone() });
        let session = MediaSession::new_outbound(session_id, self_handle, NO_HANDLE, sip.clone(), handles.clone(), observer);

        Self {
            object_path,
            creator: self_handle,
            self_handle,
            peer: NO_HANDLE,
            dialog: None,
            session,
            members_current: vec![self_handle],
            members_local_pending: Vec::new(),
            members_remote_pending: Vec::new(),
            nat: NatTraversal::None,
            closed: false,
            signals,
            sip,
            handles,
            events,
        }
    }

    fn we_are_initiator(&self) -> bool {
        self.session.initiator == self.self_handle
    }

    /// Add a stream slot, created not-ready, bound to an (optional) media
    /// engine handle. Returns the stream's ordinal.
    pub fn add_stream(&mut self, kind: MediaKind, engine: Option<Arc<dyn MediaEngineHandle>>) -> usize {
        let index = self.session.streams.len();
        self.session.streams.push(MediaStream::new(index, kind, engine));
        index
    }

    /// Set the peer on a freshly minted outgoing channel. Only valid once,
    /// before any peer is set.
    pub async fn add_member(&mut self, handle: ContactHandle) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidHandle { reason: "channel is closed".into() });
        }
        if self.peer != NO_HANDLE {
            return Err(Error::InvalidArgument { reason: "channel already has a peer".into() });
        }
        if handle == self.self_handle || handle == NO_HANDLE {
            return Err(Error::InvalidHandle { reason: "cannot place a call to self".into() });
        }

        self.handles.hold(handle);
        self.peer = handle;
        self.session.peer = handle;
        self.members_remote_pending.push(handle);
        Ok(())
    }

    /// Equivalent of `add_member`, for a channel the factory minted in
    /// response to an inbound INVITE: the peer and dialog are already known.
    pub async fn receive_invite(&mut self, dialog: DialogHandle, from_handle: ContactHandle) {
        self.handles.hold(from_handle);
        self.creator = from_handle;
        self.peer = from_handle;
        self.session.initiator = from_handle;
        self.session.peer = self.self_handle;
        self.session.bind_dialog(dialog);
        self.dialog = Some(dialog);
        self.members_local_pending.push(from_handle);
        self.events.channel_created(&self.object_path).await;
    }

    /// Deliver a re-INVITE on the bound dialog: re-arm the offer/answer
    /// step and, if a new remote SDP was carried, apply it before stepping.
    pub async fn receive_reinvite(&mut self, remote_sdp: Option<String>) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.session.offer_pending = true;

        if let Some(sdp) = remote_sdp {
            let ok = self
                .session
                .apply_remote_sdp(&sdp, |index, kind| MediaStream::new(index, kind, None))
                .await;
            if !ok {
                self.fail(Error::MediaUnsupported).await;
                return Err(Error::MediaUnsupported);
            }
        }

        self.session.step(self.we_are_initiator()).await;
        self.sync_dialog();
        self.drain_signals().await;
        Ok(())
    }

    /// Drain any signals the session has queued since the channel last ran
    /// (notably a timeout firing from its detached timer task, which has no
    /// other way back into the channel). An embedder's main loop should call
    /// this periodically on every live channel; every other public method on
    /// this type already does so itself after driving the session.
    pub async fn pump(&mut self) {
        if self.closed {
            return;
        }
        self.drain_signals().await;
    }

    /// A media-engine event for one of our streams. Re-runs the
    /// offer/answer step afterwards, since readiness may have changed.
    pub async fn on_stream_event(&mut self, stream_index: usize, event: MediaEngineEvent) {
        if self.closed {
            return;
        }
        self.session.on_stream_event(stream_index, event).await;
        let initiator = self.we_are_initiator();
        self.session.step(initiator).await;
        self.sync_dialog();
        self.drain_signals().await;
    }

    /// Apply a remote SDP body arriving on the established dialog outside of
    /// a re-INVITE (e.g. the 200 OK answer to our own INVITE).
    pub async fn apply_remote_sdp(&mut self, sdp: &str) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let ok = self
            .session
            .apply_remote_sdp(sdp, |index, kind| MediaStream::new(index, kind, None))
            .await;
        if !ok {
            self.fail(Error::MediaUnsupported).await;
            return Err(Error::MediaUnsupported);
        }
        self.drain_signals().await;
        Ok(())
    }

    /// Flip local acceptance and re-run the step. No-op on a closed channel.
    pub async fn accept(&mut self) {
        if self.closed {
            return;
        }
        self.session.locally_accepted = true;
        let initiator = self.we_are_initiator();
        self.session.step(initiator).await;
        self.sync_dialog();
        self.drain_signals().await;
    }

    /// Reject the call. On a dialog that was never answered, sends `603
    /// Decline` before terminating; otherwise just terminates.
    pub async fn reject(&mut self) {
        if self.closed {
            return;
        }
        if let Some(dialog) = self.dialog {
            if self.session.state != SessionState::Active {
                debug!(channel = %self.object_path, "declining call");
                self.sip.respond(dialog, 603, "Decline", None).await;
                // The decline itself is the final response to the INVITE;
                // a BYE on top of it would be a protocol violation, so the
                // session must not try to send one on terminate.
                self.session.dialog = None;
            }
        }
        self.session.terminate().await;
        self.close_internal().await;
    }

    /// Close the channel: terminate the session (BYE if applicable), mark
    /// closed, and emit `Closed`. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.session.terminate().await;
        self.close_internal().await;
    }

    async fn close_internal(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.handles.release(self.peer);
        self.events.closed(&self.object_path).await;
        info!(channel = %self.object_path, "channel closed");
    }

    async fn fail(&mut self, _error: Error) {
        self.session.terminate().await;
        self.close_internal().await;
    }

    /// Surface a SIP error response from the peer. Returns the error the
    /// caller should propagate, unless it was the expected `487` during a
    /// self-initiated cancel (in which case the channel still closes but no
    /// error is surfaced).
    pub async fn peer_error(&mut self, status: u16, phrase: &str, self_initiated_cancel: bool) -> Option<Error> {
        if self.closed {
            return None;
        }
        let expected_cancel = status == 487 && self_initiated_cancel;

        // The dialog never established if we were still waiting on our own
        // outbound INVITE's final response.
        let dialog_established = self.session.state == SessionState::Active;
        if !dialog_established {
            self.session.dialog = None;
            self.dialog = None;
        }
        self.session.terminate().await;
        self.close_internal().await;

        if expected_cancel {
            None
        } else {
            Some(Error::RemotePeerError { status, phrase: phrase.to_string() })
        }
    }

    fn sync_dialog(&mut self) {
        if self.dialog.is_none() {
            self.dialog = self.session.dialog;
        }
    }

    async fn drain_signals(&mut self) {
        let pending: Vec<ChannelSignal> = {
            let mut queue = self.signals.lock().unwrap();
            queue.drain(..).collect()
        };

        for signal in pending {
            match signal {
                ChannelSignal::SessionStateChanged(SessionState::Active) => {
                    if let Some(idx) = self.members_remote_pending.iter().position(|h| *h == self.peer) {
                        self.members_remote_pending.remove(idx);
                        self.members_current.push(self.peer);
                    }
                    if let Some(idx) = self.members_local_pending.iter().position(|h| *h == self.peer) {
                        self.members_local_pending.remove(idx);
                        self.members_current.push(self.peer);
                    }
                }
                ChannelSignal::SessionStateChanged(_) => {}
                ChannelSignal::SessionTerminated => {
                    // Reaches here either as an echo of a `terminate()` call
                    // already on this turn's call stack (a no-op, the session
                    // is already `Ended`) or as the routed firing of the
                    // 50-second timeout from a detached task, in which case
                    // this is the first and only call and must still run the
                    // BYE-on-established-dialog logic.
                    self.session.terminate().await;
                    self.close_internal().await;
                }
            }
        }
    }
}
