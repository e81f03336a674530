//! Positions, Holdings, and Margin Limits
//!
//! Read-side portfolio endpoints. Positions and holdings are GETs
//! gated by `require_view`; the margin limits call posts its filter
//! under `jData` and needs a trading session. Holdings live on the
//! portfolio service, which wraps payloads in the same `{data}`
//! envelope but uses camelCase field names instead of the Orders
//! host's terse codes.

use std::sync::Arc;

use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ApiError, Envelope, apply_auth_headers, apply_server_id, send_authenticated};
use crate::config::NeoConfig;
use crate::session::SessionManager;
use crate::transport::{ApiRequest, RequestBody, TransportClient};

const POSITIONS_PATH: &str = "Orders/2.0/quick/user/positions";
const LIMITS_PATH: &str = "Orders/2.0/quick/user/limits";
const HOLDINGS_PATH: &str = "Portfolio/1.0/portfolio/v1/holdings";

// =============================================================================
// Response Types
// =============================================================================

/// One open position.
///
/// Quantities and amounts arrive string-encoded on parts of the
/// gateway fleet, so every numeric field decodes from both JSON
/// numbers and strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Trading symbol, e.g. `"RELIANCE-EQ"`.
    #[serde(rename = "trdSym")]
    pub trading_symbol: String,

    /// Exchange segment wire name.
    #[serde(rename = "exSeg", default)]
    pub exchange_segment: Option<String>,

    /// Instrument token.
    #[serde(rename = "tok", default)]
    pub instrument_token: Option<String>,

    /// Product wire code.
    #[serde(rename = "prod", default)]
    pub product: Option<String>,

    /// Quantity bought today.
    #[serde(rename = "flBuyQty", default)]
    pub buy_quantity: Option<Decimal>,

    /// Quantity sold today.
    #[serde(rename = "flSellQty", default)]
    pub sell_quantity: Option<Decimal>,

    /// Quantity carried forward on the buy side.
    #[serde(rename = "cfBuyQty", default)]
    pub carry_forward_buy_quantity: Option<Decimal>,

    /// Quantity carried forward on the sell side.
    #[serde(rename = "cfSellQty", default)]
    pub carry_forward_sell_quantity: Option<Decimal>,

    /// Value bought today.
    #[serde(rename = "buyAmt", default)]
    pub buy_amount: Option<Decimal>,

    /// Value sold today.
    #[serde(rename = "sellAmt", default)]
    pub sell_amount: Option<Decimal>,
}

impl Position {
    /// Net open quantity: buys minus sells, carry-forward included.
    /// Positive is long, negative is short.
    #[must_use]
    pub fn net_quantity(&self) -> Decimal {
        let buys = self.buy_quantity.unwrap_or_default()
            + self.carry_forward_buy_quantity.unwrap_or_default();
        let sells = self.sell_quantity.unwrap_or_default()
            + self.carry_forward_sell_quantity.unwrap_or_default();
        buys - sells
    }
}

/// One demat holding, from the portfolio service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Display symbol, e.g. `"RELIANCE"`.
    #[serde(rename = "displaySymbol")]
    pub symbol: String,

    /// ISIN of the instrument.
    #[serde(default)]
    pub isin: Option<String>,

    /// Exchange segment wire name.
    #[serde(rename = "exchangeSegment", default)]
    pub exchange_segment: Option<String>,

    /// Instrument token on that segment.
    #[serde(rename = "instrumentToken", default)]
    pub instrument_token: Option<i64>,

    /// Held quantity.
    #[serde(default)]
    pub quantity: Option<Decimal>,

    /// Average acquisition price.
    #[serde(rename = "averagePrice", default)]
    pub average_price: Option<Decimal>,

    /// Previous close price.
    #[serde(rename = "closingPrice", default)]
    pub closing_price: Option<Decimal>,

    /// Market value at the previous close.
    #[serde(rename = "mktValue", default)]
    pub market_value: Option<Decimal>,

    /// Total acquisition cost.
    #[serde(rename = "holdingCost", default)]
    pub holding_cost: Option<Decimal>,
}

/// Margin and cash limits for one filter combination.
///
/// The gateway reports many more keys than these; unrecognized ones
/// are ignored on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginLimits {
    /// Account category.
    #[serde(rename = "Category", default)]
    pub category: Option<String>,

    /// Net available balance.
    #[serde(rename = "Net", default)]
    pub net: Option<Decimal>,

    /// Margin currently blocked.
    #[serde(rename = "MarginUsed", default)]
    pub margin_used: Option<Decimal>,

    /// Collateral value counted toward margin.
    #[serde(rename = "CollateralValue", default)]
    pub collateral_value: Option<Decimal>,
}

/// Filter posted under `jData` by the limits call.
#[derive(Debug, Serialize)]
struct LimitsRequest<'a> {
    #[serde(rename = "seg")]
    segment: &'a str,
    #[serde(rename = "exch")]
    exchange: &'a str,
    #[serde(rename = "prod")]
    product: &'a str,
}

// =============================================================================
// Portfolio API
// =============================================================================

/// Portfolio endpoints, sharing the session and connection pool.
#[derive(Debug)]
pub struct PortfolioApi {
    session: Arc<SessionManager>,
    transport: Arc<TransportClient>,
    rest_base_url: String,
}

impl PortfolioApi {
    /// Portfolio endpoints for the configured environment.
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

    /// Every open position for the day.
    ///
    /// # Errors
    ///
    /// [`ApiError::Auth`] when the session holds no view token,
    /// otherwise the transport and envelope taxonomy.
    pub async fn positions(&self) -> Result<Vec<Position>, ApiError> {
        let credential = self.session.require_view()?;
        let request = apply_server_id(
            apply_auth_headers(
                ApiRequest::new(
                    Method::GET,
                    format!("{}/{POSITIONS_PATH}", self.rest_base_url),
                ),
                &credential,
                self.session.consumer_key(),
            )?,
            &credential,
        );

        let envelope: Envelope<Vec<Position>> =
            send_authenticated(&self.session, &self.transport, request).await?;
        envelope.into_data()
    }

    /// Every demat holding.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`positions`](Self::positions).
    pub async fn holdings(&self) -> Result<Vec<Holding>, ApiError> {
        let credential = self.session.require_view()?;
        let request = apply_auth_headers(
            ApiRequest::new(
                Method::GET,
                format!("{}/{HOLDINGS_PATH}", self.rest_base_url),
            ),
            &credential,
            self.session.consumer_key(),
        )?;

        let envelope: Envelope<Vec<Holding>> =
            send_authenticated(&self.session, &self.transport, request).await?;
        envelope.into_data()
    }

    /// Margin limits for a segment/exchange/product filter.
    ///
    /// The gateway's filter vocabulary: segment `CASH`/`CUR`/`FO`/
    /// `ALL`, exchange `NSE`/`BSE`/`ALL`, product codes or `ALL`.
    ///
    /// # Errors
    ///
    /// [`ApiError::Auth`] when the session cannot trade, otherwise the
    /// transport and envelope taxonomy.
    pub async fn limits(
        &self,
        segment: &str,
        exchange: &str,
        product: &str,
    ) -> Result<MarginLimits, ApiError> {
        let credential = self.session.require_trade_authenticated()?;
        let body = RequestBody::trading_form(&LimitsRequest {
            segment,
            exchange,
            product,
        })
        .map_err(ApiError::Transport)?;

        let request = apply_server_id(
            apply_auth_headers(
                ApiRequest::new(
                    Method::POST,
                    format!("{}/{LIMITS_PATH}", self.rest_base_url),
                ),
                &credential,
                self.session.consumer_key(),
            )?,
            &credential,
        )
        .body(body);

        let envelope: Envelope<MarginLimits> =
            send_authenticated(&self.session, &self.transport, request).await?;
        envelope.into_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_position_with_string_quantities() {
        let json = r#"{
            "trdSym": "RELIANCE-EQ",
            "exSeg": "nse_cm",
            "tok": "11536",
            "prod": "MIS",
            "flBuyQty": "10",
            "flSellQty": "4",
            "cfBuyQty": "2",
            "cfSellQty": "0",
            "buyAmt": "15000.00",
            "sellAmt": "6010.50"
        }"#;
        let position: Position = serde_json::from_str(json).unwrap();
        assert_eq!(position.trading_symbol, "RELIANCE-EQ");
        assert_eq!(position.net_quantity(), Decimal::from(8));
    }

    #[test]
    fn test_deserialize_position_with_numeric_quantities() {
        let json = r#"{"trdSym": "TCS-EQ", "flBuyQty": 5, "flSellQty": 9}"#;
        let position: Position = serde_json::from_str(json).unwrap();
        assert_eq!(position.net_quantity(), Decimal::from(-4));
    }

    #[test]
    fn net_quantity_of_empty_position_is_zero() {
        let position: Position = serde_json::from_str(r#"{"trdSym": "X"}"#).unwrap();
        assert_eq!(position.net_quantity(), Decimal::ZERO);
    }

    #[test]
    fn test_deserialize_holding() {
        let json = r#"{
            "displaySymbol": "RELIANCE",
            "isin": "INE002A01018",
            "exchangeSegment": "nse_cm",
            "instrumentToken": 11536,
            "quantity": 25,
            "averagePrice": 1450.10,
            "closingPrice": 1502.35,
            "mktValue": 37558.75,
            "holdingCost": 36252.50
        }"#;
        let holding: Holding = serde_json::from_str(json).unwrap();
        assert_eq!(holding.symbol, "RELIANCE");
        assert_eq!(holding.instrument_token, Some(11536));
        assert_eq!(holding.quantity, Some(Decimal::from(25)));
        assert_eq!(holding.closing_price, Some(Decimal::new(150_235, 2)));
    }

    #[test]
    fn test_deserialize_margin_limits() {
        let json = r#"{
            "Category": "CLIENT",
            "Net": "100000.00",
            "MarginUsed": "25000.00",
            "CollateralValue": "0"
        }"#;
        let limits: MarginLimits = serde_json::from_str(json).unwrap();
        assert_eq!(limits.net, Some(Decimal::new(10_000_000, 2)));
        assert_eq!(limits.margin_used, Some(Decimal::new(2_500_000, 2)));
    }

    #[test]
    fn limits_request_wire_shape() {
        let request = LimitsRequest {
            segment: "ALL",
            exchange: "ALL",
            product: "ALL",
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"seg":"ALL","exch":"ALL","prod":"ALL"}"#);
    }
}
