//! Minimal SDP (RFC 4566) m-line splitting
//!
//! The core does not implement a full SDP parser — per scope, that's the
//! underlying library's job (here, bundled with the SIP stack). What the
//! offer/answer state machine needs is narrower: split a body into ordered
//! m-line sections and classify each by media type, so remote SDP can be
//! routed to the matching (or newly created) [`super::stream::MediaStream`].

use crate::media::stream::MediaKind;

/// One m-line section: its `m=` line plus every attribute line that follows
/// it, up to (not including) the next `m=` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MLineSection {
    pub kind: MediaKind,
    /// The full section text, `m=` line included, `\r\n`-joined.
    pub text: String,
}

/// Split an SDP body into its ordered m-line sections.
///
/// Lines before the first `m=` (the session-level section: `v=`, `o=`,
/// `s=`, ...) are dropped — the offer/answer step only needs per-stream
/// sections; session-level fields are the stack's concern.
pub fn split_m_lines(sdp: &str) -> Vec<MLineSection> {
    let mut sections: Vec<MLineSection> = Vec::new();

    for line in sdp.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("m=") {
            let kind = classify(rest);
            sections.push(MLineSection { kind, text: line.to_string() });
        } else if let Some(last) = sections.last_mut() {
            last.text.push_str("\r\n");
            last.text.push_str(line);
        }
    }

    sections
}

fn classify(m_line_rest: &str) -> MediaKind {
    match m_line_rest.split_whitespace().next() {
        Some("audio") => MediaKind::Audio,
        Some("video") => MediaKind::Video,
        _ => MediaKind::Unsupported,
    }
}

/// Join stream SDP fragments, in stream order, into one outbound SDP body.
///
/// Each fragment is whatever [`super::stream::MediaStream::sdp_fragment`]
/// returns; `Unsupported` streams contribute the `m=unknown 0 -/-`
/// placeholder so the m-line count and ordering is preserved.
pub fn join_fragments(fragments: &[String]) -> String {
    fragments.join("\r\n")
}
