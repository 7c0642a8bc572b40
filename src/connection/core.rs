//! `ConnectionCore` — SIP stack ownership, REGISTER lifecycle, event dispatch
//!
//! Owns the SIP transport handle for one account, drives registration and
//! its authentication challenges, and is the single serialization point
//! inbound protocol traffic passes through before reaching a channel.

use crate::connection::auth::{handle_challenge, local_user_for, AuthState, ChallengeOutcome};
use crate::connection::config::ConnectionConfig;
use crate::connection::events::EventSink;
use crate::connection::helpers::{contact_uri_for_session, KeepaliveScheduler, KeepaliveSink};
use crate::error::Result;
use crate::handle::{ContactHandle, HandleRepository};
use crate::media::factory::{ChannelType, HandleType, MediaChannelFactory, RequestOutcome};
use crate::sip::{Challenge, SipEvent, SipTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection-level status. Monotonic except that `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// One SIP account's connection: REGISTER lifecycle, authentication ledger,
/// and the channel factory it owns.
pub struct ConnectionCore {
    pub config: ConnectionConfig,
    pub status: ConnectionStatus,
    pub self_handle: ContactHandle,
    pub factory: MediaChannelFactory,

    auth: AuthState,
    sip: Arc<dyn SipTransport>,
    handles: Arc<HandleRepository>,
    events: Arc<dyn EventSink>,
    keepalive: KeepaliveScheduler,
}

impl ConnectionCore {
    pub fn new(config: ConnectionConfig, sip: Arc<dyn SipTransport>, events: Arc<dyn EventSink>) -> Self {
        let handles = HandleRepository::new();
        let self_handle = handles.handle_for_uri(&config.account_uri);
        let connection_path = format!("/connection{}", self_handle);
        let factory = MediaChannelFactory::new(connection_path, self_handle, sip.clone(), handles.clone(), events.clone());

        Self {
            config,
            status: ConnectionStatus::Connecting,
            self_handle,
            factory,
            auth: AuthState::default(),
            sip,
            handles,
            events,
            keepalive: KeepaliveScheduler::new(),
        }
    }

    /// Issue the initial REGISTER at account bring-up.
    pub async fn register(&mut self) {
        self.status = ConnectionStatus::Connecting;
        let contact = contact_uri_for_session(&self.config.account_uri, None);
        self.sip.send_register(&self.config.registrar_uri, &contact, self.config.register_expires_secs).await;
    }

    /// Client-initiated disconnect: shut down the stack and release every channel.
    pub async fn disconnect(&mut self) {
        self.sip.shutdown().await;
        self.teardown().await;
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == ConnectionStatus::Disconnected {
            return;
        }
        self.status = status;
    }

    async fn teardown(&mut self) {
        self.factory.close_all().await;
        self.keepalive.cancel();
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Arm the periodic application-level keepalive, if configured.
    pub fn arm_keepalive(&mut self, sink: Arc<dyn KeepaliveSink>) {
        self.keepalive.arm(self.config.keepalive_mechanism, Duration::from_secs(self.config.keepalive_interval_secs), sink);
    }

    /// The single serialization point for inbound SIP traffic: one event at
    /// a time, dispatched by kind.
    pub async fn dispatch(&mut self, event: SipEvent) {
        match event {
            SipEvent::RShutdown => self.on_shutdown().await,
            SipEvent::RRegister { status, phrase, challenge } => self.on_register_response(status, &phrase, challenge).await,
            SipEvent::RUnregister { status, phrase } => self.on_unregister_response(status, &phrase),
            SipEvent::RInvite { dialog, status, phrase, challenge, remote_sdp } => {
                self.on_invite_response(dialog, status, &phrase, challenge, remote_sdp).await
            }
            SipEvent::IInvite { dialog, from_uri, sdp } => {
                self.factory.route_invite(dialog, &from_uri, sdp).await;
            }
            SipEvent::IState { dialog, remote_sdp, terminated } => {
                self.factory.route_state(dialog, remote_sdp, terminated).await;
            }
            SipEvent::IMessage { .. } | SipEvent::RMessage { .. } => {
                // Text-channel path: decoding/routing lives outside the call-control core.
            }
            SipEvent::Unknown { dialog, expired } => {
                if expired {
                    self.factory.handle_unknown_expired(dialog).await;
                }
            }
        }
    }

    async fn on_shutdown(&mut self) {
        info!("stack instance shut down");
        self.teardown().await;
    }

    async fn on_register_response(&mut self, status: u16, phrase: &str, challenge: Option<Challenge>) {
        if status < 200 {
            return;
        }

        let local_user = local_user_for(&self.config.account_uri).to_string();
        let outcome = handle_challenge(status, challenge.as_ref(), true, &local_user, &self.config, &mut self.auth);

        match outcome {
            ChallengeOutcome::Failure => {
                warn!(status, phrase, "registration authentication failed");
                self.teardown().await;
            }
            ChallengeOutcome::Handled => {
                debug!("submitted registration credentials, awaiting next response");
            }
            ChallengeOutcome::Pass => match status {
                200 => {
                    self.set_status(ConnectionStatus::Connected);
                    info!("registered");
                }
                403 => {
                    warn!("registration forbidden");
                    self.teardown().await;
                }
                s if s >= 300 => {
                    warn!(status = s, "registration failed");
                    self.teardown().await;
                }
                _ => {}
            },
        }
    }

    fn on_unregister_response(&mut self, status: u16, phrase: &str) {
        if status == 401 || status == 407 {
            debug!(status, phrase, "unregister challenged, ignoring");
        }
    }

    async fn on_invite_response(
        &mut self,
        dialog: crate::sip::DialogHandle,
        status: u16,
        phrase: &str,
        challenge: Option<Challenge>,
        remote_sdp: Option<String>,
    ) {
        if status < 200 {
            return;
        }

        let local_user = local_user_for(&self.config.account_uri).to_string();
        let outcome = handle_challenge(status, challenge.as_ref(), false, &local_user, &self.config, &mut self.auth);
        if outcome == ChallengeOutcome::Handled {
            return;
        }

        if status >= 300 {
            if let Some(err) = self.factory.route_peer_error(dialog, status, phrase).await {
                debug!(?err, "peer error surfaced to channel");
            }
            return;
        }

        if status == 200 {
            self.factory.route_state(dialog, remote_sdp, false).await;
        }
    }

    /// Drain queued channel signals — notably 50-second timeout firings from
    /// detached session timers, which have no other path back into a
    /// channel. Call this on a regular tick alongside `dispatch`.
    pub async fn pump(&mut self) {
        self.factory.pump().await;
    }

    /// Request a new streamed-media channel.
    pub async fn request_media_channel(&mut self, handle_type: HandleType, handle: ContactHandle) -> Result<RequestOutcome> {
        self.factory.request(ChannelType::StreamedMedia, handle_type, handle).await
    }

    /// Resolve (or mint) a contact handle for a URI.
    pub fn handle_for_uri(&self, uri: &str) -> ContactHandle {
        self.handles.handle_for_uri(uri)
    }
}
