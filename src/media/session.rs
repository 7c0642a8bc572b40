//! `MediaSession` — the offer/answer state machine
//!
//! This is the core of the core: it owns the ordered stream list for one
//! call, drives the SDP offer/answer handshake across three independent
//! asynchronous inputs (peer SIP traffic, the local media engine, and local
//! user acceptance), and emits INVITE/200 OK/BYE through the bound
//! [`crate::sip::SipTransport`].

use crate::handle::{ContactHandle, HandleRepository};
use crate::media::sdp::{join_fragments, split_m_lines};
use crate::media::stream::{MediaEngineEvent, MediaKind, MediaStream};
use crate::sip::{CandidateSelectionPreference, CandidateSortingPreference, DialogHandle, SipTransport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How long a session may sit in `PendingInitiated` before it is forced to terminate.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(50);

/// Lifecycle state of a [`MediaSession`].
///
/// Transitions are monotonic — `Ended` is terminal and the only state no
/// other state transitions out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    PendingCreated,
    PendingInitiated,
    Active,
    Ended,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended)
    }
}

/// Forwards session-level notifications to whatever owns the session,
/// without the session holding a strong (or even identified) back-pointer
/// to its channel — per the design, this replaces a stored back-pointer.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// The session moved to a new state.
    async fn on_state_changed(&self, _state: SessionState) {}

    /// The session ended (BYE, timeout, error, or explicit terminate). Must
    /// be safe to call more than once; the session itself only calls it
    /// once, but observers should treat repeat delivery as a no-op.
    async fn on_terminated(&self) {}
}

/// A no-op observer, useful for tests and for sessions created before their
/// owning channel is known.
pub struct NullObserver;

#[async_trait]
impl SessionObserver for NullObserver {
    async fn on_state_changed(&self, _state: SessionState) {}
    async fn on_terminated(&self) {}
}

/// One call's SDP offer/answer state machine and ordered stream list.
pub struct MediaSession {
    pub session_id: u32,
    pub initiator: ContactHandle,
    pub peer: ContactHandle,
    pub state: SessionState,
    pub locally_accepted: bool,
    pub offer_pending: bool,
    pub streams: Vec<MediaStream>,
    /// Non-owning copy of the dialog handle bound by the channel once the
    /// SIP dialog is established. `None` until then.
    pub dialog: Option<DialogHandle>,

    terminated_emitted: AtomicBool,
    sip: Arc<dyn SipTransport>,
    handles: Arc<HandleRepository>,
    observer: Arc<dyn SessionObserver>,
    timeout_task: Option<tokio::task::JoinHandle<()>>,
}

impl std::fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSession")
            .field("session_id", &self.session_id)
            .field("initiator", &self.initiator)
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("offer_pending", &self.offer_pending)
            .field("streams", &self.streams.len())
            .finish()
    }
}

impl MediaSession {
    /// Create a session for an outbound call: `initiator` is our own handle.
    pub fn new_outbound(
        session_id: u32,
        initiator: ContactHandle,
        peer: ContactHandle,
        sip: Arc<dyn SipTransport>,
        handles: Arc<HandleRepository>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            session_id,
            initiator,
            peer,
            state: SessionState::PendingCreated,
            locally_accepted: false,
            offer_pending: true,
            streams: Vec::new(),
            dialog: None,
            terminated_emitted: AtomicBool::new(false),
            sip,
            handles,
            observer,
            timeout_task: None,
        }
    }

    /// Create a session for an inbound call: `initiator` is the peer's handle.
    pub fn new_inbound(
        session_id: u32,
        peer: ContactHandle,
        self_handle: ContactHandle,
        sip: Arc<dyn SipTransport>,
        handles: Arc<HandleRepository>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let mut session = Self::new_outbound(session_id, peer, self_handle, sip, handles, observer);
        // For an inbound session the peer is the initiator; `peer` on this
        // struct always names "the other party", so swap fields accordingly.
        session.initiator = peer;
        session.peer = self_handle;
        session
    }

    /// Bind the dialog handle once the SIP dialog is established. Per the
    /// design this never changes once set.
    pub fn bind_dialog(&mut self, dialog: DialogHandle) {
        if self.dialog.is_none() {
            self.dialog = Some(dialog);
        }
    }

    /// Whether every stream (including `Unsupported` sentinels) is ready.
    pub fn all_streams_ready(&self) -> bool {
        !self.streams.is_empty() && self.streams.iter().all(|s| s.ready)
    }

    /// Handle a media-engine event for one of our streams by index.
    pub async fn on_stream_event(&mut self, index: usize, event: MediaEngineEvent) {
        if let Some(stream) = self.streams.get_mut(index) {
            stream.on_engine_event(event).await;
        }
        if self.all_streams_ready() {
            self.advance_to_initiated().await;
        }
    }

    async fn advance_to_initiated(&mut self) {
        if self.state == SessionState::PendingCreated {
            self.state = SessionState::PendingInitiated;
            self.arm_timeout();
            self.observer.on_state_changed(self.state).await;
        }
    }

    /// Flip local acceptance (user called Accept) and re-run the step.
    pub async fn accept_locally(&mut self, initiator_is_initiator: bool) {
        self.locally_accepted = true;
        self.step(initiator_is_initiator).await;
    }

    /// The offer/answer step: idempotent, proceeds only when every stream is
    /// ready and an offer or answer is still pending.
    ///
    /// `we_are_initiator` disambiguates outbound vs. inbound handling, since
    /// `MediaSession` has no notion of "our own handle" beyond what the
    /// owning `MediaChannel` tells it.
    pub async fn step(&mut self, we_are_initiator: bool) {
        if !self.all_streams_ready() || !self.offer_pending {
            return;
        }

        let sdp = self.build_sdp();

        if we_are_initiator {
            let peer_uri = self.handles.uri_for_handle(self.peer);
            let dialog = match self.dialog {
                Some(d) => d,
                None => {
                    let uri = match peer_uri {
                        Some(uri) => uri,
                        None => {
                            warn!(session_id = self.session_id, "cannot resolve peer handle to URI");
                            return;
                        }
                    };
                    self.sip.create_dialog(&uri).await
                }
            };
            self.bind_dialog(dialog);

            // Start local media before sending so it can flow the instant
            // the answer arrives.
            self.set_all_playing(true).await;
            self.sip
                .send_invite(
                    dialog,
                    &sdp,
                    CandidateSortingPreference::Remote,
                    CandidateSelectionPreference::All,
                )
                .await;
            self.offer_pending = false;
            debug!(session_id = self.session_id, "sent INVITE offer");
        } else {
            if !self.locally_accepted {
                return;
            }
            let dialog = match self.dialog {
                Some(d) => d,
                None => {
                    warn!(session_id = self.session_id, "cannot answer without a bound dialog");
                    return;
                }
            };
            self.set_all_playing(true).await;
            self.sip.respond(dialog, 200, "OK", Some(&sdp)).await;
            self.offer_pending = false;
            debug!(session_id = self.session_id, "sent 200 OK answer");
        }
    }

    async fn set_all_playing(&mut self, playing: bool) {
        for stream in &mut self.streams {
            stream.set_playing(playing).await;
        }
    }

    /// Concatenate every stream's SDP fragment, in order, into one body.
    fn build_sdp(&self) -> String {
        let fragments: Vec<String> = self.streams.iter().map(|s| s.sdp_fragment()).collect();
        join_fragments(&fragments)
    }

    /// Apply a remote SDP body: iterate m-lines in order, reusing or
    /// creating streams to match, then transition to `Active`.
    ///
    /// Returns an error-shaped `false` if the body carried no supported
    /// media at all (the caller should terminate per `MediaUnsupported`).
    pub async fn apply_remote_sdp(&mut self, sdp: &str, stream_factory: impl Fn(usize, MediaKind) -> MediaStream) -> bool {
        let sections = split_m_lines(sdp);
        if sections.is_empty() {
            return false;
        }

        let mut saw_supported = false;
        for (index, section) in sections.iter().enumerate() {
            if section.kind != MediaKind::Unsupported {
                saw_supported = true;
            }
            if index >= self.streams.len() {
                self.streams.push(stream_factory(index, section.kind));
            }
            if let Some(stream) = self.streams.get_mut(index) {
                stream.apply_remote(&section.text, sdp).await;
            }
        }

        if !saw_supported {
            return false;
        }

        self.cancel_timeout();
        self.state = SessionState::Active;
        self.observer.on_state_changed(self.state).await;
        true
    }

    /// Arm the 50-second session timer. A no-op if already armed.
    ///
    /// On fire, the observer's `on_terminated` is invoked directly; the
    /// session itself is not reachable from the spawned task (it isn't
    /// `Send` as a `&mut` reference across an await point), so the observer
    /// is expected to route the firing back into the owning channel/core,
    /// which then calls [`MediaSession::terminate`] on its next turn.
    pub fn arm_timeout(&mut self) {
        if self.timeout_task.is_some() {
            return;
        }
        let observer = self.observer.clone();
        self.timeout_task = Some(tokio::spawn(async move {
            tokio::time::sleep(SESSION_TIMEOUT).await;
            observer.on_terminated().await;
        }));
    }

    /// Cancel the session timer. Called exactly when state leaves `PendingInitiated`.
    pub fn cancel_timeout(&mut self) {
        if let Some(handle) = self.timeout_task.take() {
            handle.abort();
        }
    }

    /// Whether the 50-second timer is currently armed.
    pub fn is_timer_armed(&self) -> bool {
        self.timeout_task.is_some()
    }

    /// Terminate the session: send BYE if a dialog is bound and we've
    /// reached a point where the peer believes the call exists, then move
    /// to `Ended`. Idempotent — a second call emits no traffic and no event.
    pub async fn terminate(&mut self) {
        if self.state == SessionState::Ended {
            return;
        }

        self.cancel_timeout();

        let should_send_bye = matches!(self.state, SessionState::PendingInitiated | SessionState::Active) && self.dialog.is_some();
        if should_send_bye {
            if let Some(dialog) = self.dialog {
                self.sip.send_bye(dialog).await;
            }
        }

        self.state = SessionState::Ended;
        self.observer.on_state_changed(self.state).await;

        if !self.terminated_emitted.swap(true, Ordering::SeqCst) {
            self.observer.on_terminated().await;
        }
    }

    /// Feature tags to advertise in the Contact header (`audio`, `video`),
    /// derived from the set of non-`Unsupported` streams.
    pub fn contact_features(&self) -> Vec<&'static str> {
        let mut features = Vec::new();
        if self.streams.iter().any(|s| s.kind == MediaKind::Audio) {
            features.push("audio");
        }
        if self.streams.iter().any(|s| s.kind == MediaKind::Video) {
            features.push("video");
        }
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sip::mock::MockTransport;

    fn session(sip: Arc<MockTransport>, handles: Arc<HandleRepository>) -> MediaSession {
        MediaSession::new_outbound(1_000_001, 1, 2, sip, handles, Arc::new(NullObserver))
    }

    #[tokio::test]
    async fn step_is_idempotent_when_offer_already_cleared() {
        let sip = Arc::new(MockTransport::new());
        let handles = HandleRepository::new();
        handles.handle_for_uri("sip:bob@example.com");
        let mut s = session(sip.clone(), handles);
        s.streams.push(MediaStream::new(0, MediaKind::Audio, None));
        s.on_stream_event(0, MediaEngineEvent::Ready { codecs: vec![] }).await;

        s.step(true).await;
        assert_eq!(sip.invite_count(), 1);

        // Calling again with nothing changed must not send a second INVITE.
        s.step(true).await;
        assert_eq!(sip.invite_count(), 1);
    }

    #[tokio::test]
    async fn inbound_answer_waits_for_local_acceptance() {
        let sip = Arc::new(MockTransport::new());
        let handles = HandleRepository::new();
        let peer = handles.handle_for_uri("sip:alice@example.com");
        let mut s = MediaSession::new_inbound(1_000_002, peer, 1, sip.clone(), handles, Arc::new(NullObserver));
        s.bind_dialog(DialogHandle(7));
        s.streams.push(MediaStream::new(0, MediaKind::Audio, None));
        s.on_stream_event(0, MediaEngineEvent::Ready { codecs: vec![] }).await;

        // Not accepted yet: no 200 OK.
        s.step(false).await;
        assert_eq!(sip.ok_response_count(), 0);

        s.accept_locally(false).await;
        assert_eq!(sip.ok_response_count(), 1);
    }

    #[tokio::test]
    async fn apply_remote_sdp_with_only_unsupported_media_fails() {
        let sip = Arc::new(MockTransport::new());
        let handles = HandleRepository::new();
        let mut s = session(sip, handles);
        let ok = s
            .apply_remote_sdp("m=application 0 UDP 100", |idx, kind| MediaStream::new(idx, kind, None))
            .await;
        assert!(!ok);
        assert_eq!(s.state, SessionState::PendingCreated);
    }

    #[tokio::test]
    async fn apply_remote_sdp_preserves_m_line_ordinal_for_unsupported() {
        let sip = Arc::new(MockTransport::new());
        let handles = HandleRepository::new();
        let mut s = session(sip, handles);
        let sdp = "m=audio 5004 RTP/AVP 0\r\nm=application 5006 UDP 100\r\nm=video 5008 RTP/AVP 96";
        let ok = s.apply_remote_sdp(sdp, |idx, kind| MediaStream::new(idx, kind, None)).await;
        assert!(ok);
        assert_eq!(s.state, SessionState::Active);
        assert_eq!(s.streams.len(), 3);
        assert_eq!(s.streams[1].kind, MediaKind::Unsupported);
        assert_eq!(s.streams[1].sdp_fragment(), "m=unknown 0 -/-");
    }

    #[tokio::test]
    async fn terminate_is_idempotent_and_sends_bye_once() {
        let sip = Arc::new(MockTransport::new());
        let handles = HandleRepository::new();
        let mut s = session(sip.clone(), handles);
        s.state = SessionState::Active;
        s.bind_dialog(DialogHandle(3));

        s.terminate().await;
        assert_eq!(sip.bye_count(), 1);
        assert_eq!(s.state, SessionState::Ended);

        s.terminate().await;
        assert_eq!(sip.bye_count(), 1);
    }

    #[tokio::test]
    async fn timer_arms_on_pending_initiated_and_cancels_on_active() {
        let sip = Arc::new(MockTransport::new());
        let handles = HandleRepository::new();
        let peer = handles.handle_for_uri("sip:alice@example.com");
        let mut s = MediaSession::new_inbound(1_000_003, peer, 1, sip, handles, Arc::new(NullObserver));
        s.streams.push(MediaStream::new(0, MediaKind::Audio, None));
        assert!(!s.is_timer_armed());

        s.on_stream_event(0, MediaEngineEvent::Ready { codecs: vec![] }).await;
        assert_eq!(s.state, SessionState::PendingInitiated);
        assert!(s.is_timer_armed());

        s.apply_remote_sdp("m=audio 5004 RTP/AVP 0", |idx, kind| MediaStream::new(idx, kind, None)).await;
        assert_eq!(s.state, SessionState::Active);
        assert!(!s.is_timer_armed());
    }

    #[tokio::test]
    async fn terminate_before_dialog_established_sends_no_bye() {
        let sip = Arc::new(MockTransport::new());
        let handles = HandleRepository::new();
        let mut s = session(sip.clone(), handles);
        s.terminate().await;
        assert_eq!(sip.bye_count(), 0);
        assert_eq!(s.state, SessionState::Ended);
    }
}
