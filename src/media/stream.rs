//! `MediaStream` — one SDP m-line
//!
//! A stream owns exactly one m-line's worth of negotiation state. It does
//! not transport media itself; it exchanges codecs and candidates with an
//! external [`MediaEngine`] and tracks the local/remote SDP fragments the
//! owning [`super::session::MediaSession`] needs to build or apply a
//! complete offer/answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The kind of media a stream carries.
///
/// `Unsupported` streams still occupy an ordinal slot — the design requires
/// preserving m-line ordering even for media this core can't negotiate, so
/// a non-audio/video m-line becomes a stream that accepts but ignores
/// everything and contributes the `m=unknown 0 -/-` placeholder line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
    Unsupported,
}

/// A single negotiated or negotiating codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codec {
    pub payload_type: u8,
    pub name: String,
    pub clock_rate: u32,
}

/// A single ICE-style candidate, opaque beyond what the media engine needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate(pub String);

/// Signals the media engine raises asynchronously for one stream.
///
/// These arrive independently of SIP traffic and of the user's local
/// acceptance — the offer/answer step is invoked whenever one of them
/// changes a stream's readiness (`spec.md` §4.2).
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEngineEvent {
    NewActiveCandidatePair(Candidate, Candidate),
    NewNativeCandidate(Candidate),
    Ready { codecs: Vec<Codec> },
    SupportedCodecs(Vec<Codec>),
}

/// Per-stream capability exposed by the external media engine.
///
/// One instance is owned per [`MediaStream`]; the stream forwards
/// negotiation results to it and reads readiness/local SDP back out.
#[async_trait]
pub trait MediaEngineHandle: Send + Sync {
    /// Apply the remote m-line (and the containing SDP, for session-level
    /// attributes) to this stream's engine binding.
    async fn set_remote_info(&self, m_line: &str, full_sdp: &str);

    /// Start or stop local media flow on this stream.
    async fn set_playing(&self, playing: bool);

    /// The engine's current local SDP fragment for this stream, if any.
    async fn local_sdp(&self) -> Option<String>;

    /// Whether the engine has computed local SDP and is ready to negotiate.
    async fn is_ready(&self) -> bool;
}

/// One SDP m-line's worth of negotiation state.
///
/// `identifier` is the stream's index within the owning session's ordered
/// stream list — it is also the m-line ordinal, which is why streams are
/// never reordered or removed once created, only ever added in order.
pub struct MediaStream {
    pub identifier: usize,
    pub kind: MediaKind,
    pub local_sdp: String,
    pub remote_sdp: String,
    pub ready: bool,
    pub playing: bool,
    pub local_candidates: Vec<Candidate>,
    pub remote_candidates: Vec<Candidate>,
    pub supported_codecs: Vec<Codec>,
    engine: Option<std::sync::Arc<dyn MediaEngineHandle>>,
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("identifier", &self.identifier)
            .field("kind", &self.kind)
            .field("ready", &self.ready)
            .field("playing", &self.playing)
            .finish()
    }
}

impl MediaStream {
    /// Create a new stream at the given ordinal, bound to an engine handle.
    ///
    /// `Unsupported` streams are created without an engine binding — they
    /// are immediately ready (there is nothing to negotiate) and only ever
    /// contribute the placeholder m-line.
    pub fn new(identifier: usize, kind: MediaKind, engine: Option<std::sync::Arc<dyn MediaEngineHandle>>) -> Self {
        let ready = matches!(kind, MediaKind::Unsupported);
        Self {
            identifier,
            kind,
            local_sdp: String::new(),
            remote_sdp: String::new(),
            ready,
            playing: false,
            local_candidates: Vec::new(),
            remote_candidates: Vec::new(),
            supported_codecs: Vec::new(),
            engine,
        }
    }

    /// Handle an asynchronous signal from the media engine, refreshing
    /// readiness and cached local SDP/codecs as appropriate.
    pub async fn on_engine_event(&mut self, event: MediaEngineEvent) {
        match event {
            MediaEngineEvent::NewActiveCandidatePair(local, remote) => {
                if !self.local_candidates.contains(&local) {
                    self.local_candidates.push(local);
                }
                if !self.remote_candidates.contains(&remote) {
                    self.remote_candidates.push(remote);
                }
            }
            MediaEngineEvent::NewNativeCandidate(candidate) => {
                self.local_candidates.push(candidate);
            }
            MediaEngineEvent::SupportedCodecs(codecs) => {
                self.supported_codecs = codecs;
            }
            MediaEngineEvent::Ready { codecs } => {
                self.supported_codecs = codecs;
                if let Some(engine) = &self.engine {
                    self.local_sdp = engine.local_sdp().await.unwrap_or_default();
                }
                self.ready = true;
            }
        }
    }

    /// Apply a remote m-line (and its containing SDP) from an offer or answer.
    ///
    /// `Unsupported` streams accept but ignore the content — they never
    /// fail negotiation, they just don't participate in it.
    pub async fn apply_remote(&mut self, m_line: &str, full_sdp: &str) {
        self.remote_sdp = m_line.to_string();
        if let Some(engine) = &self.engine {
            engine.set_remote_info(m_line, full_sdp).await;
        }
    }

    /// Start or stop local media flow. `Unsupported` streams have no engine
    /// binding and ignore this.
    pub async fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
        if let Some(engine) = &self.engine {
            engine.set_playing(playing).await;
        }
    }

    /// This stream's contribution to an outbound SDP body. Port 0 signals
    /// "media disabled" when there's no codec agreement yet.
    pub fn sdp_fragment(&self) -> String {
        match self.kind {
            MediaKind::Unsupported => "m=unknown 0 -/-".to_string(),
            _ if self.local_sdp.is_empty() => {
                let kind = if self.kind == MediaKind::Audio { "audio" } else { "video" };
                format!("m={} 0 RTP/AVP", kind)
            }
            _ => self.local_sdp.clone(),
        }
    }
}
