//! REST Endpoint Layer
//!
//! Thin request builders over [`SessionManager`] and
//! [`TransportClient`], one concern per module:
//!
//! - **orders**: place, modify, cancel, and the order/trade reports
//! - **portfolio**: positions, holdings, margin limits
//! - **quotes**: market quotes by `"segment|token"` composite
//! - **types**: the typed wire vocabulary shared by all of them
//!
//! Trading payloads are form-encoded under a single `jData` field and
//! responses arrive in `{stat, stCode, data}` envelopes; a rejected
//! envelope surfaces as [`ApiError::Rejected`]. A `401` on any
//! authenticated call marks the session expired before the error is
//! returned, so subsequent calls fail the session gate instead of
//! hammering the gateway.

pub mod orders;
pub mod portfolio;
pub mod quotes;
pub mod types;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::NEO_FIN_KEY;
use crate::session::{AuthError, Credential, SessionManager};
use crate::transport::{ApiRequest, TransportClient, TransportError};

pub use orders::{
    CancelOrderRequest, ModifyOrderRequest, OrderApi, OrderBookEntry, OrderRequest,
    OrderResponse, TradeReportEntry,
};
pub use portfolio::{Holding, MarginLimits, PortfolioApi, Position};
pub use quotes::{Quote, QuoteApi, QuoteInstrument};
pub use types::{
    ExchangeSegment, OrderType, Product, QuoteType, TransactionType, ValidationError, Validity,
};

// =============================================================================
// Error Type
// =============================================================================

/// Errors surfaced by the endpoint layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request failed local validation and was never sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The session gate refused the call.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The transport failed after exhausting its policy.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The gateway answered but rejected the request in its envelope.
    #[error("gateway rejected the request ({code:?}): {message}")]
    Rejected {
        /// Gateway status code from the envelope, e.g. `5001`.
        code: Option<i32>,
        /// Gateway-provided message.
        message: String,
    },
}

// =============================================================================
// Response Envelope
// =============================================================================

/// The `{stat, stCode, data}` wrapper the gateway puts around report
/// payloads.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    /// `"Ok"` on success, `"Not_Ok"` on rejection. Some report
    /// endpoints omit it entirely.
    #[serde(default)]
    pub stat: Option<String>,

    /// Gateway status code.
    #[serde(rename = "stCode", default)]
    pub st_code: Option<i32>,

    /// Rejection detail.
    #[serde(rename = "errMsg", alias = "emsg", default)]
    pub err_msg: Option<String>,

    /// The payload proper.
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    fn is_ok(&self) -> bool {
        self.stat
            .as_deref()
            .is_none_or(|stat| stat.eq_ignore_ascii_case("ok"))
    }

    /// Unwrap the payload, converting a rejected or empty envelope
    /// into [`ApiError::Rejected`].
    pub fn into_data(self) -> Result<T, ApiError> {
        if !self.is_ok() {
            return Err(ApiError::Rejected {
                code: self.st_code,
                message: self
                    .err_msg
                    .unwrap_or_else(|| "gateway rejected the request".to_string()),
            });
        }
        self.data.ok_or(ApiError::Rejected {
            code: self.st_code,
            message: "response envelope carried no data".to_string(),
        })
    }
}

// =============================================================================
// Shared Request Plumbing
// =============================================================================

/// Attach the authenticated header set.
///
/// Prefers the edit token pair when present (trading sessions), falls
/// back to the view pair. The gates in [`SessionManager`] guarantee a
/// usable pair exists for callers that went through them.
pub(crate) fn apply_auth_headers(
    request: ApiRequest,
    credential: &Credential,
    consumer_key: &str,
) -> Result<ApiRequest, AuthError> {
    let (auth, sid) = if let Some((token, sid)) = credential.trade_tokens() {
        (token.to_string(), sid.to_string())
    } else if let (Some(token), Some(sid)) =
        (&credential.view_token, &credential.base_session_id)
    {
        (token.clone(), sid.clone())
    } else {
        return Err(AuthError::SessionNotReady {
            reason: "no usable token pair held".to_string(),
        });
    };

    Ok(request
        .header("Authorization", consumer_key)
        .header("Sid", sid)
        .header("Auth", auth)
        .header("neo-fin-key", NEO_FIN_KEY))
}

/// Pin a trading call to the session's trading server, when known.
pub(crate) fn apply_server_id(request: ApiRequest, credential: &Credential) -> ApiRequest {
    match &credential.server_id {
        Some(server_id) => request.query("sId", server_id),
        None => request,
    }
}

/// Send an authenticated request, marking the session expired on a
/// `401` before surfacing the error.
pub(crate) async fn send_authenticated<T: DeserializeOwned>(
    session: &SessionManager,
    transport: &TransportClient,
    request: ApiRequest,
) -> Result<T, ApiError> {
    match transport.send(&request).await {
        Ok(value) => Ok(value),
        Err(error) => {
            if error.status() == Some(401) {
                tracing::warn!(
                    url = request.url(),
                    "authenticated call returned 401, marking session expired"
                );
                session.mark_expired();
            }
            Err(ApiError::Transport(error))
        }
    }
}
