//! Challenge/response authentication
//!
//! Implements the 401/407 challenge handler: realm tracking, credential
//! selection (home realm vs. auxiliary), authorization-token construction,
//! and loop detection against the last token submitted.

use crate::connection::config::ConnectionConfig;
use crate::sip::Challenge;
use tracing::{debug, info};

/// Per-connection authentication state that survives across challenges.
/// Kept as a single ledger (not keyed by realm/user) per the design's
/// resolution of the open question about mixed home/auxiliary credentials.
#[derive(Debug, Default, Clone)]
pub struct AuthState {
    pub registrar_realm: Option<String>,
    pub last_sent_auth: Option<String>,
}

/// Result of running the challenge handler for one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// Not a challenge (or the challenge was cleared); caller proceeds with
    /// its own status-based handling.
    Pass,
    /// A fresh authorization was submitted; await the next response.
    Handled,
    /// The same credentials were rejected twice in a row.
    Failure,
}

/// Extract the `user` part of a `sip:user@host` URI, if present.
fn uri_user(uri: &str) -> &str {
    let without_scheme = uri.split_once(':').map(|(_, rest)| rest).unwrap_or(uri);
    without_scheme.split('@').next().unwrap_or(without_scheme)
}

fn quote_realm(realm: &str) -> String {
    if realm.starts_with('"') && realm.ends_with('"') && realm.len() >= 2 {
        realm.to_string()
    } else {
        format!("\"{}\"", realm)
    }
}

/// Run the challenge handler for one SIP response.
///
/// `home_realm` is true only when the response being handled is to a
/// REGISTER request. `local_user` is the From.user (falling back to
/// To.user) the caller resolved for this transaction.
pub fn handle_challenge(
    status: u16,
    challenge: Option<&Challenge>,
    home_realm: bool,
    local_user: &str,
    config: &ConnectionConfig,
    state: &mut AuthState,
) -> ChallengeOutcome {
    if status != 401 && status != 407 {
        state.last_sent_auth = None;
        return ChallengeOutcome::Pass;
    }

    let challenge = match challenge {
        Some(c) => c,
        None => return ChallengeOutcome::Failure,
    };
    let realm = match &challenge.realm {
        Some(r) if !r.is_empty() => r.clone(),
        _ => return ChallengeOutcome::Failure,
    };

    let mut is_home_realm = home_realm;
    if home_realm {
        if state.registrar_realm.as_deref() != Some(realm.as_str()) {
            info!(old = ?state.registrar_realm, new = %realm, "registrar realm changed");
            state.registrar_realm = Some(realm.clone());
        }
    } else if state.registrar_realm.as_deref() == Some(realm.as_str()) {
        is_home_realm = true;
    }

    let (user, password) = if is_home_realm {
        (local_user.to_string(), config.password.clone())
    } else if let Some(aux) = &config.aux_credentials {
        (aux.user.clone(), aux.password.clone())
    } else {
        (local_user.to_string(), config.password.clone())
    };

    let token = format!("{}:{}:{}:{}", challenge.scheme, quote_realm(&realm), user, password);

    if state.last_sent_auth.as_deref() == Some(token.as_str()) {
        debug!(realm = %realm, "identical credentials rejected twice, giving up");
        return ChallengeOutcome::Failure;
    }

    state.last_sent_auth = Some(token);
    ChallengeOutcome::Handled
}

/// Derive the local user to present for a request against `account_uri`,
/// falling back to the account URI's own user part.
pub fn local_user_for(account_uri: &str) -> &str {
    uri_user(account_uri)
}
