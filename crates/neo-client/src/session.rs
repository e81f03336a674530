//! Session Management
//!
//! Two-factor TOTP session flow against the Neo gateway:
//!
//! 1. `login(mobile_number, ucc, totp)` exchanges the one-time password
//!    for a view token and a base session id (read-only access).
//! 2. `validate(mpin)` exchanges the trading PIN for an edit token plus
//!    its session and request ids (trading access).
//!
//! # Request Headers
//!
//! | Call     | Headers                                              |
//! |----------|------------------------------------------------------|
//! | login    | `Authorization` (consumer key), `neo-fin-key`        |
//! | validate | `Authorization`, `sid`, `Auth` (view token), `neo-fin-key` |
//!
//! The manager owns the [`Credential`] and the [`SessionState`]; endpoint
//! callers only ever see immutable snapshots. Neither `login` nor
//! `validate` is retried internally: the broker does not treat them as
//! idempotent, so a transient failure is surfaced with state unchanged
//! and the caller decides whether to re-invoke.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::config::{NEO_FIN_KEY, NeoConfig};
use crate::transport::{ApiRequest, RequestBody, TransportClient, TransportError};

// =============================================================================
// Constants
// =============================================================================

const TOTP_LOGIN_PATH: &str = "login/1.0/login/v6/totp/login";
const TOTP_VALIDATE_PATH: &str = "login/1.0/login/v6/totp/validate";
const LOGOFF_PATH: &str = "login/1.0/login/v2/logoff";

// =============================================================================
// Error Types
// =============================================================================

/// Errors surfaced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The broker rejected the login (bad UCC, mobile number, or TOTP).
    #[error("login rejected: invalid credentials or one-time password")]
    InvalidCredentials,

    /// The broker rejected the trading PIN.
    #[error("validation rejected: invalid PIN")]
    InvalidPin,

    /// The operation needs a session state the manager is not in.
    #[error("session not ready: {reason}")]
    SessionNotReady {
        /// What is missing for the operation to proceed.
        reason: String,
    },

    /// Transport-level failure; state is unchanged and the call may be
    /// retried by the caller.
    #[error("network failure during session call: {0}")]
    Network(#[from] TransportError),
}

// =============================================================================
// Credential
// =============================================================================

/// The complete set of session tokens, treated as opaque strings.
///
/// Serializable so an embedding application can persist a session and
/// hand it back later through [`SessionManager::restore`]. `edit_token`
/// and `edit_session_id` are only meaningful together; trading gates
/// reject a credential carrying one without the other.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Token authorizing read-only calls (quotes, holdings, positions).
    pub view_token: Option<String>,
    /// Token authorizing order-mutating calls.
    pub edit_token: Option<String>,
    /// Session id bound to the edit token.
    pub edit_session_id: Option<String>,
    /// Request id issued alongside the edit token.
    pub edit_request_id: Option<String>,
    /// Session id issued at login, consumed by `validate`.
    pub base_session_id: Option<String>,
    /// Trading server the session is pinned to.
    pub server_id: Option<String>,
    /// When the newest token in this set was issued.
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    /// A credential with no tokens, stamped now.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            view_token: None,
            edit_token: None,
            edit_session_id: None,
            edit_request_id: None,
            base_session_id: None,
            server_id: None,
            issued_at: Utc::now(),
        }
    }

    /// Whether a view token is present.
    #[must_use]
    pub const fn has_view_token(&self) -> bool {
        self.view_token.is_some()
    }

    /// The edit token and its session id, only if both are present.
    #[must_use]
    pub fn trade_tokens(&self) -> Option<(&str, &str)> {
        match (&self.edit_token, &self.edit_session_id) {
            (Some(token), Some(sid)) => Some((token.as_str(), sid.as_str())),
            _ => None,
        }
    }

    /// Whether the edit token and edit session id are coherent: both
    /// present or both absent.
    #[must_use]
    pub const fn edit_fields_coherent(&self) -> bool {
        self.edit_token.is_some() == self.edit_session_id.is_some()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(field: Option<&String>) -> &'static str {
            if field.is_some() { "[REDACTED]" } else { "None" }
        }

        f.debug_struct("Credential")
            .field("view_token", &mask(self.view_token.as_ref()))
            .field("edit_token", &mask(self.edit_token.as_ref()))
            .field("edit_session_id", &mask(self.edit_session_id.as_ref()))
            .field("edit_request_id", &mask(self.edit_request_id.as_ref()))
            .field("base_session_id", &mask(self.base_session_id.as_ref()))
            .field("server_id", &self.server_id)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Where the session stands in the two-factor flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No tokens held.
    #[default]
    Unauthenticated,

    /// Login succeeded; view token held, trading not yet enabled.
    ViewAuthenticated,

    /// Validate succeeded (or a credential was restored); trading enabled.
    TradeAuthenticated,

    /// The server signalled expiry; `validate` recovers the session.
    Expired,
}

impl SessionState {
    /// Whether read-only endpoint calls are permitted.
    #[must_use]
    pub const fn can_read(&self) -> bool {
        matches!(self, Self::ViewAuthenticated | Self::TradeAuthenticated)
    }

    /// Whether order-mutating endpoint calls are permitted.
    #[must_use]
    pub const fn can_trade(&self) -> bool {
        matches!(self, Self::TradeAuthenticated)
    }

    /// Whether `validate` may be called from this state.
    ///
    /// `TradeAuthenticated` is included so a restored session can be
    /// re-validated to confirm liveness.
    #[must_use]
    pub const fn can_validate(&self) -> bool {
        !matches!(self, Self::Unauthenticated)
    }

    /// The state name, for logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::ViewAuthenticated => "view_authenticated",
            Self::TradeAuthenticated => "trade_authenticated",
            Self::Expired => "expired",
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct TotpLoginRequest<'a> {
    #[serde(rename = "mobileNumber")]
    mobile_number: &'a str,
    ucc: &'a str,
    totp: &'a str,
}

#[derive(Debug, Serialize)]
struct TotpValidateRequest<'a> {
    mpin: &'a str,
}

/// Session responses arrive wrapped in a `data` object.
#[derive(Debug, Deserialize)]
struct SessionEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
    sid: String,
}

#[derive(Debug, Deserialize)]
struct ValidateData {
    token: String,
    sid: String,
    rid: String,
    #[serde(rename = "hsServerId")]
    hs_server_id: String,
    #[serde(rename = "dataCenter", default)]
    data_center: Option<String>,
    #[serde(rename = "baseUrl", default)]
    base_url: Option<String>,
}

// =============================================================================
// Session Manager
// =============================================================================

struct SessionInner {
    state: SessionState,
    credential: Option<Credential>,
}

/// Owns the credential and the session state machine.
///
/// ```text
/// Unauthenticated --login(ok)--> ViewAuthenticated --validate(ok)--> TradeAuthenticated
/// login/validate(network failure): state unchanged, error surfaced
/// TradeAuthenticated --logout--> Unauthenticated
/// any --mark_expired--> Expired --validate(ok)--> TradeAuthenticated
/// restore(credential) --> TradeAuthenticated (liveness unconfirmed)
/// ```
///
/// Credential mutation is a single atomic replacement under a write
/// lock; concurrent readers see either the old or the new token set in
/// full, never a mix.
pub struct SessionManager {
    transport: Arc<TransportClient>,
    consumer_key: String,
    session_base_url: String,
    inner: RwLock<SessionInner>,
}

impl SessionManager {
    /// Create a manager for the configured environment.
    #[must_use]
    pub fn new(config: &NeoConfig, transport: Arc<TransportClient>) -> Self {
        Self {
            transport,
            consumer_key: config.credentials.consumer_key().to_string(),
            session_base_url: config.environment.session_base_url().to_string(),
            inner: RwLock::new(SessionInner {
                state: SessionState::Unauthenticated,
                credential: None,
            }),
        }
    }

    /// Point at an explicit session gateway base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.session_base_url = url.into();
        self
    }

    /// The current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.read().state
    }

    /// An immutable copy of the current credential, if any.
    ///
    /// Mutating the returned value has no effect on the session; all
    /// credential changes go through manager operations.
    #[must_use]
    pub fn snapshot(&self) -> Option<Credential> {
        self.inner.read().credential.clone()
    }

    /// First factor: exchange the TOTP for a view token.
    ///
    /// On success the session holds a fresh credential and moves to
    /// [`SessionState::ViewAuthenticated`]; any previously held tokens
    /// are discarded. On failure state and credential are unchanged.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] if the broker rejects the
    /// one-time password; [`AuthError::Network`] on transport failure.
    pub async fn login(
        &self,
        mobile_number: &str,
        ucc: &str,
        totp: &str,
    ) -> Result<Credential, AuthError> {
        let body = RequestBody::json(&TotpLoginRequest {
            mobile_number,
            ucc,
            totp,
        })?;

        let request = ApiRequest::new(
            Method::POST,
            format!("{}/{}", self.session_base_url, TOTP_LOGIN_PATH),
        )
        .header("Authorization", &self.consumer_key)
        .header("neo-fin-key", NEO_FIN_KEY)
        .body(body);

        let response: SessionEnvelope<LoginData> = self
            .transport
            .send(&request)
            .await
            .map_err(|e| classify_rejection(e, AuthError::InvalidCredentials))?;

        let credential = Credential {
            view_token: Some(response.data.token),
            base_session_id: Some(response.data.sid),
            issued_at: Utc::now(),
            ..Credential::empty()
        };

        let snapshot = credential.clone();
        {
            let mut inner = self.inner.write();
            inner.credential = Some(credential);
            inner.state = SessionState::ViewAuthenticated;
        }

        tracing::info!(state = SessionState::ViewAuthenticated.as_str(), "Login succeeded");
        Ok(snapshot)
    }

    /// Second factor: exchange the trading PIN for an edit token.
    ///
    /// Permitted from `ViewAuthenticated`, `Expired`, and (to confirm a
    /// restored session) `TradeAuthenticated`. On success the session
    /// moves to [`SessionState::TradeAuthenticated`]. On failure state
    /// and credential are unchanged.
    ///
    /// # Errors
    ///
    /// [`AuthError::SessionNotReady`] when called before `login`;
    /// [`AuthError::InvalidPin`] if the broker rejects the PIN;
    /// [`AuthError::Network`] on transport failure.
    pub async fn validate(&self, mpin: &str) -> Result<Credential, AuthError> {
        // Copy what the request needs; the lock must not be held across
        // the network call.
        let (view_token, base_session_id) = {
            let inner = self.inner.read();
            if !inner.state.can_validate() {
                return Err(AuthError::SessionNotReady {
                    reason: "validate requires a prior login".to_string(),
                });
            }
            let credential = inner.credential.as_ref().ok_or_else(|| {
                AuthError::SessionNotReady {
                    reason: "no credential held".to_string(),
                }
            })?;
            let view_token =
                credential
                    .view_token
                    .clone()
                    .ok_or_else(|| AuthError::SessionNotReady {
                        reason: "credential has no view token".to_string(),
                    })?;
            let base_session_id =
                credential
                    .base_session_id
                    .clone()
                    .ok_or_else(|| AuthError::SessionNotReady {
                        reason: "credential has no base session id".to_string(),
                    })?;
            (view_token, base_session_id)
        };

        let body = RequestBody::json(&TotpValidateRequest { mpin })?;

        let request = ApiRequest::new(
            Method::POST,
            format!("{}/{}", self.session_base_url, TOTP_VALIDATE_PATH),
        )
        .header("Authorization", &self.consumer_key)
        .header("sid", &base_session_id)
        .header("Auth", &view_token)
        .header("neo-fin-key", NEO_FIN_KEY)
        .body(body);

        let response: SessionEnvelope<ValidateData> = self
            .transport
            .send(&request)
            .await
            .map_err(|e| classify_rejection(e, AuthError::InvalidPin))?;

        if let Some(data_center) = &response.data.data_center {
            tracing::debug!(data_center, "Session pinned to data center");
        }
        if let Some(base_url) = &response.data.base_url {
            tracing::debug!(base_url, "Server advertised base URL");
        }

        let credential = Credential {
            view_token: Some(view_token),
            edit_token: Some(response.data.token),
            edit_session_id: Some(response.data.sid),
            edit_request_id: Some(response.data.rid),
            base_session_id: Some(base_session_id),
            server_id: Some(response.data.hs_server_id),
            issued_at: Utc::now(),
        };

        let snapshot = credential.clone();
        {
            let mut inner = self.inner.write();
            inner.credential = Some(credential);
            inner.state = SessionState::TradeAuthenticated;
        }

        tracing::info!(
            state = SessionState::TradeAuthenticated.as_str(),
            "Validate succeeded"
        );
        Ok(snapshot)
    }

    /// Inject a previously saved credential without network I/O.
    ///
    /// The session moves to [`SessionState::TradeAuthenticated`]
    /// optimistically: nothing here confirms the tokens are still live
    /// on the broker side. Call [`SessionManager::validate`] afterwards
    /// to confirm liveness before trading; until then, trading calls are
    /// permitted and may fail server-side if the session has lapsed.
    pub fn restore(&self, credential: Credential) {
        let mut inner = self.inner.write();
        inner.credential = Some(credential);
        inner.state = SessionState::TradeAuthenticated;
        drop(inner);

        tracing::info!(
            state = SessionState::TradeAuthenticated.as_str(),
            "Credential restored; liveness unconfirmed until validate"
        );
    }

    /// End the session: best-effort server-side logoff, then clear all
    /// token fields locally and return to
    /// [`SessionState::Unauthenticated`].
    ///
    /// A failed server call is logged and does not prevent the local
    /// clear; further trading calls are rejected until a new login.
    pub async fn logout(&self) {
        let trade_headers = {
            let inner = self.inner.read();
            inner
                .credential
                .as_ref()
                .and_then(Credential::trade_tokens)
                .map(|(token, sid)| (token.to_string(), sid.to_string()))
        };

        if let Some((edit_token, edit_sid)) = trade_headers {
            let request = ApiRequest::new(
                Method::POST,
                format!("{}/{}", self.session_base_url, LOGOFF_PATH),
            )
            .header("Authorization", &self.consumer_key)
            .header("Sid", edit_sid)
            .header("Auth", edit_token)
            .header("neo-fin-key", NEO_FIN_KEY);

            if let Err(error) = self.transport.send::<serde_json::Value>(&request).await {
                tracing::warn!(%error, "Server-side logoff failed; clearing local session anyway");
            }
        }

        let mut inner = self.inner.write();
        inner.credential = None;
        inner.state = SessionState::Unauthenticated;
        drop(inner);

        tracing::info!(state = SessionState::Unauthenticated.as_str(), "Logged out");
    }

    /// Record a server-signalled expiry (e.g. a 401 on an authenticated
    /// call). The credential is kept so `validate` can recover.
    pub fn mark_expired(&self) {
        let mut inner = self.inner.write();
        if inner.state == SessionState::Unauthenticated {
            return;
        }
        inner.state = SessionState::Expired;
        drop(inner);

        tracing::warn!(state = SessionState::Expired.as_str(), "Session expired");
    }

    /// Gate for read-only endpoint calls; returns the credential they
    /// should present.
    ///
    /// # Errors
    ///
    /// [`AuthError::SessionNotReady`] unless the session holds a view
    /// token in a readable state.
    pub fn require_view(&self) -> Result<Credential, AuthError> {
        let inner = self.inner.read();
        if !inner.state.can_read() {
            return Err(AuthError::SessionNotReady {
                reason: format!("read call in state {}", inner.state.as_str()),
            });
        }
        inner
            .credential
            .as_ref()
            .filter(|credential| credential.has_view_token())
            .cloned()
            .ok_or_else(|| AuthError::SessionNotReady {
                reason: "no view token held".to_string(),
            })
    }

    /// Gate for order-mutating endpoint calls; returns the credential
    /// they should present.
    ///
    /// Enforces the pairing invariant: the edit token and edit session
    /// id must both be present (a credential carrying one without the
    /// other is rejected).
    ///
    /// # Errors
    ///
    /// [`AuthError::SessionNotReady`] unless the session is
    /// trade-authenticated with a coherent edit token pair.
    pub fn require_trade_authenticated(&self) -> Result<Credential, AuthError> {
        let inner = self.inner.read();
        if !inner.state.can_trade() {
            return Err(AuthError::SessionNotReady {
                reason: format!("trading call in state {}", inner.state.as_str()),
            });
        }
        let credential = inner
            .credential
            .as_ref()
            .ok_or_else(|| AuthError::SessionNotReady {
                reason: "no credential held".to_string(),
            })?;
        if credential.trade_tokens().is_none() {
            return Err(AuthError::SessionNotReady {
                reason: "edit token and edit session id must both be present".to_string(),
            });
        }
        Ok(credential.clone())
    }

    /// The consumer key presented on every authenticated call.
    #[must_use]
    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("SessionManager")
            .field("state", &inner.state)
            .field("credential", &inner.credential)
            .field("session_base_url", &self.session_base_url)
            .finish_non_exhaustive()
    }
}

/// Map a transport failure on a session call: an outright 4xx rejection
/// becomes the given business error, everything else stays a network
/// failure the caller may retry.
fn classify_rejection(error: TransportError, rejected: AuthError) -> AuthError {
    match &error {
        TransportError::ClientError { status, .. } if matches!(status, 400 | 401 | 403) => rejected,
        _ => AuthError::Network(error),
    }
}
