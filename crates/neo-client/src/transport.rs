//! HTTP transport with pooled connections and bounded retry.
//!
//! Every REST endpoint call goes through [`TransportClient::send`]: one
//! logical request, one body encode (done by the caller), one response
//! decode (done here), and a retry loop governed by [`RetryPolicy`].
//!
//! Failures are classified before any retry decision. Timeouts,
//! connection-level errors, and status codes in the policy's retryable
//! set are transient; everything else, including response-decode
//! failures, is permanent and surfaced immediately. Transient failures
//! are retried only when the request method is in the policy's
//! retryable set: retrying an order placement that actually reached the
//! exchange submits it twice.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode, header};
use serde::de::DeserializeOwned;

use crate::config::NeoConfig;
use crate::retry::{ExponentialBackoff, RetryPolicy};

/// User agent reported on every request.
const USER_AGENT: &str = concat!("neo-client-rs/", env!("CARGO_PKG_VERSION"));

/// Transport-level error, classified for retry decisions.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The per-attempt timeout elapsed before a response arrived.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure (refused, reset, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a 5xx (or otherwise retryable) status.
    #[error("server error: HTTP {status}")]
    ServerError {
        /// Status code returned by the server.
        status: u16,
    },

    /// The server answered with a status the policy treats as
    /// permanent: any 4xx, plus 5xx codes outside the retryable set
    /// (501, for example).
    #[error("client error: HTTP {status}: {body}")]
    ClientError {
        /// Status code returned by the server.
        status: u16,
        /// Response body text, kept for diagnosis.
        body: String,
    },

    /// The request body could not be serialized.
    #[error("failed to encode request body: {0}")]
    EncodeFailed(String),

    /// The response body did not decode into the expected shape.
    #[error("failed to decode response body: {0}")]
    DecodeFailed(String),

    /// All attempts allowed by the retry policy failed.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Total tries performed, including the first.
        attempts: u32,
        /// The last classified failure.
        last: Box<TransportError>,
    },
}

impl TransportError {
    /// Whether this failure class is eligible for retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Network(_) | Self::ServerError { .. }
        )
    }

    /// HTTP status carried by this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::ServerError { status } | Self::ClientError { status, .. } => Some(*status),
            Self::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Pre-encoded request body.
///
/// The endpoint layer performs the single serialization; the transport
/// only attaches the bytes and the matching content type.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// `application/json` payload.
    Json(String),
    /// `application/x-www-form-urlencoded` payload.
    Form(Vec<(String, String)>),
}

impl RequestBody {
    /// Serialize a value once into a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::EncodeFailed`] if serialization fails.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, TransportError> {
        serde_json::to_string(value)
            .map(Self::Json)
            .map_err(|e| TransportError::EncodeFailed(e.to_string()))
    }

    /// Serialize a value once and wrap it the way the trading gateway
    /// expects: form-encoded under a single `jData` field.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::EncodeFailed`] if serialization fails.
    pub fn trading_form<T: serde::Serialize>(value: &T) -> Result<Self, TransportError> {
        serde_json::to_string(value)
            .map(|json| Self::Form(vec![("jData".to_string(), json)]))
            .map_err(|e| TransportError::EncodeFailed(e.to_string()))
    }
}

/// One logical API request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<RequestBody>,
}

impl ApiRequest {
    /// Start building a request for the given method and absolute URL.
    #[must_use]
    pub const fn new(method: Method, url: String) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Attach a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a query parameter.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Attach a pre-encoded body.
    #[must_use]
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// The request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// The request URL (without query parameters).
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Headers attached so far, in attachment order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Query parameters attached so far, in attachment order.
    #[must_use]
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }
}

/// HTTP client shared by every endpoint: one connection pool, one retry
/// policy.
#[derive(Debug, Clone)]
pub struct TransportClient {
    client: Client,
    policy: RetryPolicy,
}

impl TransportClient {
    /// Create a transport from the client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(config: &NeoConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.transport.request_timeout)
            .connect_timeout(config.transport.connect_timeout)
            .pool_max_idle_per_host(config.transport.pool_max_idle_per_host)
            .pool_idle_timeout(config.transport.pool_idle_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            client,
            policy: config.retry.clone(),
        })
    }

    /// Build a transport around an existing policy, with default
    /// transport tuning. Intended for tests.
    pub fn with_policy(policy: RetryPolicy) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self { client, policy })
    }

    /// The retry policy this transport applies.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a request, retrying transient failures per policy, and
    /// decode the response body.
    ///
    /// # Errors
    ///
    /// Returns the classified [`TransportError`]: permanent failures
    /// immediately, transient failures after the policy's attempts are
    /// exhausted (wrapped in [`TransportError::RetriesExhausted`]).
    pub async fn send<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, TransportError> {
        let method_retryable = self.policy.is_retryable_method(request.method());
        let mut backoff = ExponentialBackoff::new(&self.policy);

        loop {
            let error = match self.attempt(request).await {
                Ok(decoded) => return Ok(decoded),
                Err(e) => e,
            };

            if !error.is_transient() {
                return Err(error);
            }

            if !method_retryable {
                // Transient, but the method is excluded from retry.
                // Surfacing immediately is a correctness requirement:
                // the request may have reached the exchange.
                return Err(error);
            }

            match backoff.next_backoff() {
                Some(delay) => {
                    tracing::warn!(
                        method = %request.method(),
                        url = %request.url(),
                        error = %error,
                        delay_ms = delay.as_millis(),
                        attempt = backoff.waits_taken(),
                        "Transient transport failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    let attempts = backoff.waits_taken() + 1;
                    tracing::error!(
                        method = %request.method(),
                        url = %request.url(),
                        error = %error,
                        attempts,
                        "Retries exhausted"
                    );
                    return Err(TransportError::RetriesExhausted {
                        attempts,
                        last: Box::new(error),
                    });
                }
            }
        }
    }

    /// One attempt: build, send, classify, decode.
    async fn attempt<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match &request.body {
            Some(RequestBody::Json(json)) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(json.clone()),
            Some(RequestBody::Form(pairs)) => builder.form(pairs),
            None => builder,
        };

        let response = builder.send().await.map_err(classify_request_error)?;
        let status = response.status();

        if status.is_success() {
            let text = response
                .text()
                .await
                .map_err(classify_request_error)?;
            return decode_body(&text);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, body, &self.policy))
    }
}

/// Classify a reqwest error for retry purposes.
fn classify_request_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_decode() {
        TransportError::DecodeFailed(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}

/// Classify a non-success HTTP status.
///
/// Statuses in the policy's retryable set become `ServerError` and drive
/// the retry loop; everything else, including 5xx codes the policy
/// excludes, is permanent and carries the response body for diagnosis.
fn classify_status(status: StatusCode, body: String, policy: &RetryPolicy) -> TransportError {
    let code = status.as_u16();
    if policy.is_retryable_status(code) {
        TransportError::ServerError { status: code }
    } else {
        TransportError::ClientError { status: code, body }
    }
}

/// Single decode of the response body.
fn decode_body<T: DeserializeOwned>(text: &str) -> Result<T, TransportError> {
    let source = if text.is_empty() { "null" } else { text };
    serde_json::from_str(source).map_err(|e| TransportError::DecodeFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_accumulates_parts() {
        let payload = serde_json::json!({ "qt": "1" });
        let request = ApiRequest::new(Method::POST, "https://example.test/path".to_string())
            .header("Auth", "token")
            .header("Sid", "session")
            .query("sId", "server1")
            .body(RequestBody::trading_form(&payload).unwrap());

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.url(), "https://example.test/path");
        assert_eq!(request.headers.len(), 2);
        assert_eq!(request.query.len(), 1);
        match &request.body {
            Some(RequestBody::Form(pairs)) => {
                assert_eq!(pairs[0].0, "jData");
                assert_eq!(pairs[0].1, r#"{"qt":"1"}"#);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn transient_classification() {
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Network("reset".into()).is_transient());
        assert!(TransportError::ServerError { status: 503 }.is_transient());
        assert!(
            !TransportError::ClientError {
                status: 400,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!TransportError::DecodeFailed("bad json".into()).is_transient());
    }

    #[test]
    fn retries_exhausted_reports_inner_status() {
        let error = TransportError::RetriesExhausted {
            attempts: 3,
            last: Box::new(TransportError::ServerError { status: 503 }),
        };
        assert_eq!(error.status(), Some(503));
        let shown = error.to_string();
        assert!(shown.contains("3 attempts"));
        assert!(shown.contains("503"));
    }

    #[test]
    fn status_classification_uses_policy_set() {
        let policy = RetryPolicy::default();
        let transient = classify_status(StatusCode::SERVICE_UNAVAILABLE, String::new(), &policy);
        assert!(transient.is_transient());

        // A 5xx outside the retryable set is permanent and lands in
        // the same variant as a 4xx.
        let permanent = classify_status(StatusCode::NOT_IMPLEMENTED, "nope".to_string(), &policy);
        assert!(!permanent.is_transient());
        match permanent {
            TransportError::ClientError { status, body } => {
                assert_eq!(status, 501);
                assert_eq!(body, "nope");
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn empty_body_decodes_as_null() {
        let decoded: Option<serde_json::Value> =
            decode_body("").unwrap_or_else(|_| panic!("empty body should decode"));
        assert!(decoded.is_none());
    }

    #[test]
    fn malformed_body_is_decode_failure() {
        let result: Result<serde_json::Value, _> = decode_body("not json at all {");
        match result {
            Err(TransportError::DecodeFailed(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
