//! Market Quotes
//!
//! Snapshot quotes for a batch of instruments, keyed by the same
//! `"segment|token"` composites the stream subscribes with. The quotes
//! host authenticates on the consumer key alone, but the call is still
//! gated by `require_view` so an unauthenticated client fails locally
//! instead of leaning on the gateway.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::{ExchangeSegment, QuoteType, ValidationError};
use super::{ApiError, Envelope, send_authenticated};
use crate::config::NeoConfig;
use crate::session::SessionManager;
use crate::transport::{ApiRequest, TransportClient};

const QUOTES_PATH: &str = "apim/quotes/v1.0/quotes";

// =============================================================================
// Request Types
// =============================================================================

/// Instrument reference for quote retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteInstrument {
    /// Segment the instrument trades on.
    pub exchange_segment: ExchangeSegment,
    /// Exchange-assigned instrument token, e.g. `"11536"`.
    pub instrument_token: String,
}

impl QuoteInstrument {
    /// Reference an instrument by segment and token.
    pub fn new(exchange_segment: ExchangeSegment, instrument_token: impl Into<String>) -> Self {
        Self {
            exchange_segment,
            instrument_token: instrument_token.into(),
        }
    }

    /// The `"segment|token"` composite for this instrument.
    #[must_use]
    pub fn composite(&self) -> String {
        format!("{}|{}", self.exchange_segment.as_str(), self.instrument_token)
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// One instrument's quote snapshot.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "symbol": "nse_cm|11536",
///   "ltp": 2450.50,
///   "open": 2440.00,
///   "high": 2465.75,
///   "low": 2435.25,
///   "close": 2445.00,
///   "volume": 1234567,
///   "oi": 0,
///   "bid": 2450.25,
///   "ask": 2450.75,
///   "bidQty": 500,
///   "askQty": 750,
///   "timestamp": "2023-06-15T14:30:00.000Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// The `"segment|token"` composite echoed back by the gateway.
    #[serde(default)]
    pub symbol: Option<String>,

    /// Last traded price.
    #[serde(rename = "ltp", default)]
    pub last_price: Option<Decimal>,

    /// Day open.
    #[serde(default)]
    pub open: Option<Decimal>,

    /// Day high.
    #[serde(default)]
    pub high: Option<Decimal>,

    /// Day low.
    #[serde(default)]
    pub low: Option<Decimal>,

    /// Previous close.
    #[serde(default)]
    pub close: Option<Decimal>,

    /// Cumulative traded volume.
    #[serde(default)]
    pub volume: Option<i64>,

    /// Open interest, zero outside derivatives.
    #[serde(rename = "oi", default)]
    pub open_interest: Option<i64>,

    /// Best bid price.
    #[serde(default)]
    pub bid: Option<Decimal>,

    /// Best ask price.
    #[serde(default)]
    pub ask: Option<Decimal>,

    /// Best bid quantity.
    #[serde(rename = "bidQty", default)]
    pub bid_quantity: Option<i64>,

    /// Best ask quantity.
    #[serde(rename = "askQty", default)]
    pub ask_quantity: Option<i64>,

    /// Gateway quote timestamp.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

// =============================================================================
// Quote API
// =============================================================================

/// Quote endpoints, sharing the session and connection pool.
#[derive(Debug)]
pub struct QuoteApi {
    session: Arc<SessionManager>,
    transport: Arc<TransportClient>,
    rest_base_url: String,
}

impl QuoteApi {
    /// Quote endpoints for the configured environment.
    #[must_use]
    pub fn new(
        config: &NeoConfig,
        session: Arc<SessionManager>,
        transport: Arc<TransportClient>,
    ) -> Self {
        Self {
            session,
            transport,
            rest_base_url: config.environment.rest_base_url().to_string(),
        }
    }

    /// Point at an explicit gateway base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = url.into();
        self
    }

    /// Snapshot quotes for a batch of instruments.
    ///
    /// The instruments travel as one comma-joined, URL-encoded
    /// `neoSymbols` query value; `quote_type` selects which slice of
    /// the snapshot the gateway returns.
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] for an empty batch, [`ApiError::Auth`]
    /// when the session holds no view token, otherwise the transport
    /// and envelope taxonomy.
    pub async fn quotes(
        &self,
        instruments: &[QuoteInstrument],
        quote_type: QuoteType,
    ) -> Result<Vec<Quote>, ApiError> {
        if instruments.is_empty() {
            return Err(ApiError::Validation(ValidationError::OutOfRange {
                field: "instruments",
                message: "at least one instrument is required".to_string(),
            }));
        }
        self.session.require_view()?;

        let neo_symbols = instruments
            .iter()
            .map(QuoteInstrument::composite)
            .collect::<Vec<_>>()
            .join(",");

        tracing::debug!(
            instruments = instruments.len(),
            quote_type = quote_type.as_str(),
            "fetching quotes"
        );

        let request = ApiRequest::new(
            Method::GET,
            format!("{}/{QUOTES_PATH}", self.rest_base_url),
        )
        .header("Authorization", self.session.consumer_key())
        .query("neoSymbols", neo_symbols)
        .query("quoteType", quote_type.as_str());

        let envelope: Envelope<Vec<Quote>> =
            send_authenticated(&self.session, &self.transport, request).await?;
        envelope.into_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_joins_segment_and_token() {
        let instrument = QuoteInstrument::new(ExchangeSegment::NseFo, "53216");
        assert_eq!(instrument.composite(), "nse_fo|53216");
    }

    #[test]
    fn test_deserialize_quote() {
        let json = r#"{
            "symbol": "nse_cm|11536",
            "ltp": 2450.50,
            "open": 2440.00,
            "high": 2465.75,
            "low": 2435.25,
            "close": 2445.00,
            "volume": 1234567,
            "oi": 0,
            "bid": 2450.25,
            "ask": 2450.75,
            "bidQty": 500,
            "askQty": 750,
            "timestamp": "2023-06-15T14:30:00.000Z"
        }"#;
        let quote: Quote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.symbol.as_deref(), Some("nse_cm|11536"));
        assert_eq!(quote.last_price, Some(Decimal::new(245_050, 2)));
        assert_eq!(quote.volume, Some(1_234_567));
        assert_eq!(quote.bid_quantity, Some(500));
        assert!(quote.timestamp.is_some());
    }

    #[test]
    fn test_deserialize_sparse_ltp_quote() {
        let quote: Quote = serde_json::from_str(r#"{"ltp": "99.95"}"#).unwrap();
        assert_eq!(quote.last_price, Some(Decimal::new(9995, 2)));
        assert!(quote.open.is_none());
        assert!(quote.timestamp.is_none());
    }
}
