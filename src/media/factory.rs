//! `MediaChannelFactory` — channel allocation and inbound INVITE routing
//!
//! Owns every live `MediaChannel` for one connection, mints object paths and
//! session identifiers, and demultiplexes inbound SIP dialog events to the
//! channel that owns that dialog — or creates a new channel, for the first
//! INVITE on a previously unknown dialog.

use crate::connection::events::EventSink;
use crate::error::{Error, Result};
use crate::handle::{ContactHandle, HandleRepository};
use crate::media::channel::MediaChannel;
use crate::media::stream::MediaEngineEvent;
use crate::sip::{DialogHandle, SipTransport};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// The only channel type this core implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    StreamedMedia,
}

/// How the target handle of a `Request` should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleType {
    /// Create an empty channel; the peer is added later via `add_member`.
    None,
    /// Create a channel already targeting the given contact handle.
    Contact,
}

/// Outcome of a channel request.
#[derive(Debug)]
pub enum RequestOutcome {
    Created(usize),
    NotImplemented,
    InvalidHandle,
}

const SESSION_ID_MIN: u32 = 1_000_000;
const SESSION_ID_MAX: u32 = i32::MAX as u32;

/// Three-valued routing state for a dialog handle: unknown, live, or
/// expired. Expiration is sticky — once a dialog is marked expired it never
/// transitions back.
#[derive(Debug, Default)]
struct DialogRouter {
    live: HashMap<DialogHandle, usize>,
    expired: HashSet<DialogHandle>,
}

impl DialogRouter {
    fn route(&self, dialog: DialogHandle) -> Option<Route> {
        if self.expired.contains(&dialog) {
            return Some(Route::Expired);
        }
        self.live.get(&dialog).copied().map(Route::Channel)
    }

    fn bind(&mut self, dialog: DialogHandle, index: usize) {
        if !self.expired.contains(&dialog) {
            self.live.insert(dialog, index);
        }
    }

    fn expire(&mut self, dialog: DialogHandle) {
        self.live.remove(&dialog);
        self.expired.insert(dialog);
    }
}

enum Route {
    Expired,
    Channel(usize),
}

/// Allocates and routes every `MediaChannel` belonging to one connection.
pub struct MediaChannelFactory {
    connection_path: String,
    self_handle: ContactHandle,
    sip: Arc<dyn SipTransport>,
    handles: Arc<HandleRepository>,
    events: Arc<dyn EventSink>,

    next_path_ordinal: u64,
    used_session_ids: HashSet<u32>,
    channels: Vec<Option<MediaChannel>>,
    dialogs: DialogRouter,
    shut_down: bool,
}

impl MediaChannelFactory {
    pub fn new(
        connection_path: String,
        self_handle: ContactHandle,
        sip: Arc<dyn SipTransport>,
        handles: Arc<HandleRepository>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            connection_path,
            self_handle,
            sip,
            handles,
            events,
            next_path_ordinal: 0,
            used_session_ids: HashSet::new(),
            channels: Vec::new(),
            dialogs: DialogRouter::default(),
            shut_down: false,
        }
    }

    fn allocate_path(&mut self) -> String {
        let ordinal = self.next_path_ordinal;
        self.next_path_ordinal += 1;
        format!("{}/MediaChannel{}", self.connection_path, ordinal)
    }

    /// Draw a session identifier unused among live channels and never
    /// handed out before in this factory's lifetime.
    fn allocate_session_id(&mut self) -> u32 {
        loop {
            let candidate = rand::thread_rng().gen_range(SESSION_ID_MIN..SESSION_ID_MAX);
            if self.used_session_ids.insert(candidate) {
                return candidate;
            }
        }
    }

    fn insert_channel(&mut self, channel: MediaChannel) -> usize {
        self.channels.push(Some(channel));
        self.channels.len() - 1
    }

    /// `Request(chan_type, handle_type, handle)`.
    pub async fn request(&mut self, chan_type: ChannelType, handle_type: HandleType, handle: ContactHandle) -> Result<RequestOutcome> {
        if self.shut_down {
            return Err(Error::InvalidArgument { reason: "factory is shutting down".into() });
        }
        if chan_type != ChannelType::StreamedMedia {
            return Ok(RequestOutcome::NotImplemented);
        }
        if handle_type == HandleType::Contact && handle == self.self_handle {
            return Ok(RequestOutcome::InvalidHandle);
        }

        let path = self.allocate_path();
        let session_id = self.allocate_session_id();
        let mut channel = MediaChannel::new(path.clone(), self.self_handle, session_id, self.sip.clone(), self.handles.clone(), self.events.clone());

        if handle_type == HandleType::Contact {
            if channel.add_member(handle).await.is_err() {
                return Ok(RequestOutcome::InvalidHandle);
            }
        }

        self.events.channel_created(&path).await;
        let index = self.insert_channel(channel);
        debug!(path, "channel created");
        Ok(RequestOutcome::Created(index))
    }

    /// Drain queued signals (notably timeout firings) on every live channel.
    /// An embedder's main loop should call this on a regular tick, alongside
    /// dispatching whatever inbound SIP events arrived since the last one.
    pub async fn pump(&mut self) {
        let mut to_reclaim = Vec::new();
        for (index, slot) in self.channels.iter_mut().enumerate() {
            if let Some(channel) = slot {
                channel.pump().await;
                if channel.closed {
                    to_reclaim.push(index);
                }
            }
        }
        for index in to_reclaim {
            self.reclaim_if_closed(index);
        }
    }

    /// Visit every live channel.
    pub fn for_each<'a>(&'a mut self, mut visitor: impl FnMut(&mut MediaChannel) + 'a) {
        for slot in &mut self.channels {
            if let Some(channel) = slot {
                visitor(channel);
            }
        }
    }

    /// Close every live channel; after this returns the factory holds none
    /// and every further `request` fails.
    pub async fn close_all(&mut self) {
        for slot in &mut self.channels {
            if let Some(channel) = slot.as_mut() {
                channel.close().await;
            }
        }
        self.channels.clear();
        self.shut_down = true;
    }

    fn lookup_mut(&mut self, index: usize) -> Option<&mut MediaChannel> {
        self.channels.get_mut(index).and_then(|slot| slot.as_mut())
    }

    /// Direct access to a live channel by index, for operations
    /// (`add_stream`, `accept`, `reject`, `close`, ...) that never bind a
    /// brand-new dialog and so need no factory-side bookkeeping afterward.
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut MediaChannel> {
        self.lookup_mut(index)
    }

    /// Deliver a media-engine event to one of a channel's streams, then
    /// learn the dialog handle if the resulting offer/answer step just
    /// created one (the outbound-INVITE case: the session mints its own
    /// dialog handle, which the factory must index before it can route the
    /// response back to this channel).
    pub async fn deliver_stream_event(&mut self, index: usize, stream_index: usize, event: MediaEngineEvent) {
        let had_dialog = self.channels.get(index).and_then(|c| c.as_ref()).and_then(|c| c.dialog).is_some();
        if let Some(channel) = self.lookup_mut(index) {
            channel.on_stream_event(stream_index, event).await;
            if !had_dialog {
                if let Some(dialog) = channel.dialog {
                    self.dialogs.bind(dialog, index);
                }
            }
        }
        self.reclaim_if_closed(index);
    }

    fn reclaim_if_closed(&mut self, index: usize) {
        let is_closed = self.channels.get(index).and_then(|s| s.as_ref()).map(|c| c.closed).unwrap_or(false);
        if is_closed {
            if let Some(channel) = self.channels[index].take() {
                self.dialogs.expire(channel.dialog.unwrap_or(DialogHandle(0)));
            }
        }
    }

    /// Route an inbound INVITE: `481` for an expired dialog, forward as a
    /// re-INVITE to a known channel, or mint a new channel for the first
    /// INVITE on an unknown dialog.
    pub async fn route_invite(&mut self, dialog: DialogHandle, from_uri: &str, sdp: Option<String>) {
        match self.dialogs.route(dialog) {
            Some(Route::Expired) => {
                self.sip.respond(dialog, 481, "Call Does Not Exist", None).await;
            }
            Some(Route::Channel(index)) => {
                if let Some(channel) = self.lookup_mut(index) {
                    let _ = channel.receive_reinvite(sdp).await;
                }
                self.reclaim_if_closed(index);
            }
            None => {
                let from_handle = self.handles.handle_for_uri(from_uri);
                let path = self.allocate_path();
                let session_id = self.allocate_session_id();
                let mut channel = MediaChannel::new(path, self.self_handle, session_id, self.sip.clone(), self.handles.clone(), self.events.clone());
                channel.receive_invite(dialog, from_handle).await;
                if let Some(sdp) = sdp {
                    let _ = channel.apply_remote_sdp(&sdp).await;
                }
                let index = self.insert_channel(channel);
                self.dialogs.bind(dialog, index);
            }
        }
    }

    /// Route a dialog state update (SDP arrival, termination) to its channel.
    pub async fn route_state(&mut self, dialog: DialogHandle, remote_sdp: Option<String>, terminated: bool) {
        let index = match self.dialogs.route(dialog) {
            Some(Route::Channel(index)) => index,
            Some(Route::Expired) | None => return,
        };

        if let Some(channel) = self.lookup_mut(index) {
            if let Some(sdp) = remote_sdp {
                let _ = channel.apply_remote_sdp(&sdp).await;
            }
            if terminated {
                channel.close().await;
            }
        }
        self.reclaim_if_closed(index);
    }

    /// Route a peer error response (`status >= 300`) to its channel.
    pub async fn route_peer_error(&mut self, dialog: DialogHandle, status: u16, phrase: &str) -> Option<Error> {
        let index = match self.dialogs.route(dialog) {
            Some(Route::Channel(index)) => index,
            Some(Route::Expired) | None => return None,
        };
        let result = if let Some(channel) = self.lookup_mut(index) {
            channel.peer_error(status, phrase, false).await
        } else {
            None
        };
        self.reclaim_if_closed(index);
        result
    }

    /// Bind a dialog handle created for an outbound INVITE to the channel
    /// that originated it (the factory learns the mapping only after the
    /// channel's own offer/answer step creates the dialog).
    pub fn bind_outbound_dialog(&mut self, index: usize, dialog: DialogHandle) {
        self.dialogs.bind(dialog, index);
    }

    /// An `Unknown` SIP event whose token is the sticky `EXPIRED` sentinel:
    /// reclaim the stack-side dialog resources and stop tracking it.
    pub async fn handle_unknown_expired(&mut self, dialog: DialogHandle) {
        warn!(?dialog, "unknown event on expired dialog, destroying");
        self.sip.destroy_dialog(dialog).await;
        self.dialogs.expire(dialog);
    }
}
