//! Order Placement and Reports
//!
//! Place, modify, and cancel orders, plus the order book, per-order
//! history, and trade report. Mutating calls are POSTs form-encoded
//! under `jData`, pinned to the session's trading server via the `sId`
//! query, and gated by `require_trade_authenticated`. The transport
//! never retries POST calls, so a timed-out placement needs caller-side
//! reconciliation against the order book before any resend.

use std::sync::Arc;

use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};

use super::types::{ExchangeSegment, OrderType, Product, TransactionType, ValidationError, Validity};
use super::{ApiError, Envelope, apply_auth_headers, apply_server_id, send_authenticated};
use crate::config::NeoConfig;
use crate::session::{Credential, SessionManager};
use crate::transport::{ApiRequest, RequestBody, TransportClient};

const PLACE_ORDER_PATH: &str = "Orders/2.0/quick/order/rule/ms/place";
const MODIFY_ORDER_PATH: &str = "Orders/2.0/quick/order/vr/modify";
const CANCEL_ORDER_PATH: &str = "Orders/2.0/quick/order/cancel";
const ORDER_BOOK_PATH: &str = "Orders/2.0/quick/user/orders";
const ORDER_HISTORY_PATH: &str = "Orders/2.0/quick/order/history";
const TRADE_REPORT_PATH: &str = "Orders/2.0/quick/user/trades";

// =============================================================================
// Wire Serialization Helpers
// =============================================================================

/// The gateway's form payloads carry numbers as strings.
fn ser_int_str<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

/// Booleans travel as `"YES"` / `"NO"`.
fn ser_yes_no<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(if *value { "YES" } else { "NO" })
}

// =============================================================================
// Request Types
// =============================================================================

/// A new order, in the gateway's `jData` field vocabulary.
///
/// # Wire Format (form-encoded JSON)
/// ```json
/// {
///   "am": "NO",
///   "dq": "0",
///   "es": "nse_cm",
///   "mp": "0",
///   "pc": "MIS",
///   "pf": "N",
///   "pr": "1500.00",
///   "pt": "L",
///   "qt": "10",
///   "rt": "DAY",
///   "tp": "0",
///   "ts": "RELIANCE-EQ",
///   "tt": "B"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// After-market order flag.
    #[serde(rename = "am", serialize_with = "ser_yes_no")]
    pub after_market: bool,

    /// Disclosed quantity; zero discloses everything.
    #[serde(rename = "dq", serialize_with = "ser_int_str")]
    pub disclosed_quantity: i64,

    /// Exchange segment the instrument trades on.
    #[serde(rename = "es")]
    pub exchange_segment: ExchangeSegment,

    /// Market protection percentage; zero for none.
    #[serde(rename = "mp", serialize_with = "ser_int_str")]
    pub market_protection: i64,

    /// Product the order books under.
    #[serde(rename = "pc")]
    pub product: Product,

    /// Portfolio flag; the gateway expects `"N"`.
    #[serde(rename = "pf")]
    pub portfolio_flag: &'static str,

    /// Limit price; zero for market orders.
    #[serde(rename = "pr")]
    pub price: Decimal,

    /// Price mechanism.
    #[serde(rename = "pt")]
    pub order_type: OrderType,

    /// Quantity in units.
    #[serde(rename = "qt", serialize_with = "ser_int_str")]
    pub quantity: i64,

    /// How long the order stays live.
    #[serde(rename = "rt")]
    pub validity: Validity,

    /// Trigger price; zero unless the order type takes one.
    #[serde(rename = "tp")]
    pub trigger_price: Decimal,

    /// Trading symbol, e.g. `"RELIANCE-EQ"`.
    #[serde(rename = "ts")]
    pub trading_symbol: String,

    /// Buy or sell.
    #[serde(rename = "tt")]
    pub transaction_type: TransactionType,
}

impl OrderRequest {
    /// A day-validity order with no price, trigger, or disclosure set.
    pub fn new(
        exchange_segment: ExchangeSegment,
        trading_symbol: impl Into<String>,
        transaction_type: TransactionType,
        product: Product,
        order_type: OrderType,
        quantity: i64,
    ) -> Self {
        Self {
            after_market: false,
            disclosed_quantity: 0,
            exchange_segment,
            market_protection: 0,
            product,
            portfolio_flag: "N",
            price: Decimal::ZERO,
            order_type,
            quantity,
            validity: Validity::Day,
            trigger_price: Decimal::ZERO,
            trading_symbol: trading_symbol.into(),
            transaction_type,
        }
    }

    /// Set the limit price.
    #[must_use]
    pub const fn with_price(mut self, price: Decimal) -> Self {
        self.price = price;
        self
    }

    /// Set the trigger price.
    #[must_use]
    pub const fn with_trigger_price(mut self, trigger_price: Decimal) -> Self {
        self.trigger_price = trigger_price;
        self
    }

    /// Set the validity.
    #[must_use]
    pub const fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }

    /// Set the disclosed quantity.
    #[must_use]
    pub const fn with_disclosed_quantity(mut self, disclosed_quantity: i64) -> Self {
        self.disclosed_quantity = disclosed_quantity;
        self
    }

    /// Mark as an after-market order.
    #[must_use]
    pub const fn after_market(mut self) -> Self {
        self.after_market = true;
        self
    }

    /// Check the field bounds the gateway would reject anyway.
    ///
    /// # Errors
    ///
    /// [`ValidationError::OutOfRange`] naming the offending wire field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_order_fields(
            self.quantity,
            self.disclosed_quantity,
            self.order_type,
            self.price,
            self.trigger_price,
            &self.trading_symbol,
        )
    }
}

/// A change to a live order. Carries the full order context the
/// gateway requires alongside the changed fields.
#[derive(Debug, Clone, Serialize)]
pub struct ModifyOrderRequest {
    /// After-market order flag.
    #[serde(rename = "am", serialize_with = "ser_yes_no")]
    pub after_market: bool,

    /// Disclosed quantity.
    #[serde(rename = "dq", serialize_with = "ser_int_str")]
    pub disclosed_quantity: i64,

    /// Exchange segment.
    #[serde(rename = "es")]
    pub exchange_segment: ExchangeSegment,

    /// Market protection percentage.
    #[serde(rename = "mp", serialize_with = "ser_int_str")]
    pub market_protection: i64,

    /// Order number being modified.
    #[serde(rename = "no")]
    pub order_number: String,

    /// New limit price.
    #[serde(rename = "pr")]
    pub price: Decimal,

    /// New price mechanism.
    #[serde(rename = "pt")]
    pub order_type: OrderType,

    /// New quantity.
    #[serde(rename = "qt", serialize_with = "ser_int_str")]
    pub quantity: i64,

    /// New validity.
    #[serde(rename = "rt")]
    pub validity: Validity,

    /// New trigger price.
    #[serde(rename = "tp")]
    pub trigger_price: Decimal,

    /// Trading symbol of the original order.
    #[serde(rename = "ts")]
    pub trading_symbol: String,

    /// Transaction type of the original order.
    #[serde(rename = "tt")]
    pub transaction_type: TransactionType,
}

impl ModifyOrderRequest {
    /// A modification keeping price, trigger, and disclosure at zero
    /// until set.
    pub fn new(
        order_number: impl Into<String>,
        exchange_segment: ExchangeSegment,
        trading_symbol: impl Into<String>,
        transaction_type: TransactionType,
        order_type: OrderType,
        quantity: i64,
    ) -> Self {
        Self {
            after_market: false,
            disclosed_quantity: 0,
            exchange_segment,
            market_protection: 0,
            order_number: order_number.into(),
            price: Decimal::ZERO,
            order_type,
            quantity,
            validity: Validity::Day,
            trigger_price: Decimal::ZERO,
            trading_symbol: trading_symbol.into(),
            transaction_type,
        }
    }

    /// Set the new limit price.
    #[must_use]
    pub const fn with_price(mut self, price: Decimal) -> Self {
        self.price = price;
        self
    }

    /// Set the new trigger price.
    #[must_use]
    pub const fn with_trigger_price(mut self, trigger_price: Decimal) -> Self {
        self.trigger_price = trigger_price;
        self
    }

    /// Set the new validity.
    #[must_use]
    pub const fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }

    /// Check the field bounds the gateway would reject anyway.
    ///
    /// # Errors
    ///
    /// [`ValidationError::OutOfRange`] naming the offending wire field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_number.is_empty() {
            return Err(ValidationError::OutOfRange {
                field: "no",
                message: "order number must not be empty".to_string(),
            });
        }
        validate_order_fields(
            self.quantity,
            self.disclosed_quantity,
            self.order_type,
            self.price,
            self.trigger_price,
            &self.trading_symbol,
        )
    }
}

/// Cancellation of a live order.
///
/// # Wire Format (form-encoded JSON)
/// ```json
/// {"on": "230825000012345", "am": "NO"}
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct CancelOrderRequest {
    /// Order number being cancelled.
    #[serde(rename = "on")]
    pub order_number: String,

    /// After-market order flag.
    #[serde(rename = "am", serialize_with = "ser_yes_no")]
    pub after_market: bool,

    /// Trading symbol, when the gateway asks for it.
    #[serde(rename = "ts", skip_serializing_if = "Option::is_none")]
    pub trading_symbol: Option<String>,
}

impl CancelOrderRequest {
    /// Cancellation by order number alone.
    pub fn new(order_number: impl Into<String>) -> Self {
        Self {
            order_number: order_number.into(),
            after_market: false,
            trading_symbol: None,
        }
    }

    /// Attach the trading symbol.
    #[must_use]
    pub fn with_trading_symbol(mut self, trading_symbol: impl Into<String>) -> Self {
        self.trading_symbol = Some(trading_symbol.into());
        self
    }
}

/// History lookups post the order number under `jData` like every
/// other trading call.
#[derive(Debug, Serialize)]
struct OrderHistoryRequest<'a> {
    #[serde(rename = "nOrdNo")]
    order_number: &'a str,
}

fn validate_order_fields(
    quantity: i64,
    disclosed_quantity: i64,
    order_type: OrderType,
    price: Decimal,
    trigger_price: Decimal,
    trading_symbol: &str,
) -> Result<(), ValidationError> {
    if trading_symbol.is_empty() {
        return Err(ValidationError::OutOfRange {
            field: "ts",
            message: "trading symbol must not be empty".to_string(),
        });
    }
    if quantity < 1 {
        return Err(ValidationError::OutOfRange {
            field: "qt",
            message: format!("quantity must be at least 1, got {quantity}"),
        });
    }
    if disclosed_quantity < 0 || disclosed_quantity > quantity {
        return Err(ValidationError::OutOfRange {
            field: "dq",
            message: format!(
                "disclosed quantity must be between 0 and the order quantity, got {disclosed_quantity}"
            ),
        });
    }
    if price < Decimal::ZERO {
        return Err(ValidationError::OutOfRange {
            field: "pr",
            message: format!("price must not be negative, got {price}"),
        });
    }
    if order_type.has_price() && price <= Decimal::ZERO {
        return Err(ValidationError::OutOfRange {
            field: "pr",
            message: format!("{} orders need a positive price", order_type.as_str()),
        });
    }
    if order_type.has_trigger() && trigger_price <= Decimal::ZERO {
        return Err(ValidationError::OutOfRange {
            field: "tp",
            message: format!("{} orders need a positive trigger price", order_type.as_str()),
        });
    }
    Ok(())
}

// =============================================================================
// Response Types
// =============================================================================

/// Acknowledgment for place, modify, and cancel calls.
///
/// # Wire Format (JSON)
/// ```json
/// {"stat": "Ok", "nOrdNo": "230825000012345", "stCode": 200}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
    /// `"Ok"` when the gateway accepted the order.
    pub stat: String,

    /// Gateway status code.
    #[serde(rename = "stCode", default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i32>,

    /// Exchange order number assigned to the request.
    #[serde(rename = "nOrdNo", default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,

    /// Rejection detail.
    #[serde(
        rename = "errMsg",
        alias = "emsg",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
}

impl OrderResponse {
    /// Whether the gateway accepted the request.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.stat.eq_ignore_ascii_case("ok")
    }
}

/// One row of the order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookEntry {
    /// Exchange order number.
    #[serde(rename = "nOrdNo")]
    pub order_number: String,

    /// Order status, e.g. `"open"`, `"complete"`, `"rejected"`.
    #[serde(rename = "ordSt", default)]
    pub status: Option<String>,

    /// Trading symbol.
    #[serde(rename = "trdSym", default)]
    pub trading_symbol: Option<String>,

    /// Exchange segment wire name.
    #[serde(rename = "exSeg", default)]
    pub exchange_segment: Option<String>,

    /// Product wire code.
    #[serde(rename = "prod", default)]
    pub product: Option<String>,

    /// Price type wire code.
    #[serde(rename = "prcTp", default)]
    pub order_type: Option<String>,

    /// Transaction type wire code.
    #[serde(rename = "trnsTp", default)]
    pub transaction_type: Option<String>,

    /// Ordered quantity.
    #[serde(rename = "qty", default)]
    pub quantity: Option<i64>,

    /// Filled quantity so far.
    #[serde(rename = "fldQty", default)]
    pub filled_quantity: Option<i64>,

    /// Order price.
    #[serde(rename = "prc", default)]
    pub price: Option<Decimal>,

    /// Average fill price.
    #[serde(rename = "avgPrc", default)]
    pub average_price: Option<Decimal>,

    /// Trigger price for stop orders.
    #[serde(rename = "trgPrc", default)]
    pub trigger_price: Option<Decimal>,

    /// Rejection reason when status is `"rejected"`.
    #[serde(rename = "rejRsn", default)]
    pub rejection_reason: Option<String>,

    /// Broker-local order timestamp, passed through verbatim.
    #[serde(rename = "ordDtTm", default)]
    pub order_time: Option<String>,
}

/// One executed fill from the trade report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReportEntry {
    /// Exchange order number the fill belongs to.
    #[serde(rename = "nOrdNo")]
    pub order_number: String,

    /// Fill identifier.
    #[serde(rename = "flId", default)]
    pub fill_id: Option<String>,

    /// Trading symbol.
    #[serde(rename = "trdSym", default)]
    pub trading_symbol: Option<String>,

    /// Exchange segment wire name.
    #[serde(rename = "exSeg", default)]
    pub exchange_segment: Option<String>,

    /// Transaction type wire code.
    #[serde(rename = "trnsTp", default)]
    pub transaction_type: Option<String>,

    /// Quantity filled in this execution.
    #[serde(rename = "fldQty", default)]
    pub filled_quantity: Option<i64>,

    /// Execution price.
    #[serde(rename = "avgPrc", default)]
    pub price: Option<Decimal>,

    /// Broker-local execution timestamp, passed through verbatim.
    #[serde(rename = "exTm", default)]
    pub execution_time: Option<String>,
}

// =============================================================================
// Order API
// =============================================================================

/// Order endpoints, sharing the session and connection pool.
#[derive(Debug)]
pub struct OrderApi {
    session: Arc<SessionManager>,
    transport: Arc<TransportClient>,
    rest_base_url: String,
}

impl OrderApi {
    /// Order endpoints for the configured environment.
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

    /// Place a new order.
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] before any I/O for out-of-range fields,
    /// [`ApiError::Auth`] when the session cannot trade,
    /// [`ApiError::Rejected`] when the gateway refuses the order, and
    /// [`ApiError::Transport`] for infrastructure failures.
    pub async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, ApiError> {
        order.validate()?;
        let credential = self.session.require_trade_authenticated()?;

        tracing::info!(
            symbol = %order.trading_symbol,
            side = order.transaction_type.as_str(),
            quantity = order.quantity,
            order_type = order.order_type.as_str(),
            "placing order"
        );

        let request = self
            .trading_request(PLACE_ORDER_PATH, &credential)?
            .body(RequestBody::trading_form(order).map_err(ApiError::Transport)?);
        let response: OrderResponse =
            send_authenticated(&self.session, &self.transport, request).await?;
        require_ok(response)
    }

    /// Modify a live order.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`place_order`](Self::place_order).
    pub async fn modify_order(
        &self,
        order: &ModifyOrderRequest,
    ) -> Result<OrderResponse, ApiError> {
        order.validate()?;
        let credential = self.session.require_trade_authenticated()?;

        tracing::info!(order_number = %order.order_number, "modifying order");

        let request = self
            .trading_request(MODIFY_ORDER_PATH, &credential)?
            .body(RequestBody::trading_form(order).map_err(ApiError::Transport)?);
        let response: OrderResponse =
            send_authenticated(&self.session, &self.transport, request).await?;
        require_ok(response)
    }

    /// Cancel a live order.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`place_order`](Self::place_order), minus
    /// validation.
    pub async fn cancel_order(
        &self,
        cancel: &CancelOrderRequest,
    ) -> Result<OrderResponse, ApiError> {
        let credential = self.session.require_trade_authenticated()?;

        tracing::info!(order_number = %cancel.order_number, "cancelling order");

        let request = self
            .trading_request(CANCEL_ORDER_PATH, &credential)?
            .body(RequestBody::trading_form(cancel).map_err(ApiError::Transport)?);
        let response: OrderResponse =
            send_authenticated(&self.session, &self.transport, request).await?;
        require_ok(response)
    }

    /// Every order for the day.
    ///
    /// # Errors
    ///
    /// [`ApiError::Auth`] when the session cannot trade, otherwise the
    /// transport and envelope taxonomy.
    pub async fn order_book(&self) -> Result<Vec<OrderBookEntry>, ApiError> {
        let credential = self.session.require_trade_authenticated()?;
        let request = apply_server_id(
            apply_auth_headers(
                ApiRequest::new(
                    Method::GET,
                    format!("{}/{ORDER_BOOK_PATH}", self.rest_base_url),
                ),
                &credential,
                self.session.consumer_key(),
            )?,
            &credential,
        );

        let envelope: Envelope<Vec<OrderBookEntry>> =
            send_authenticated(&self.session, &self.transport, request).await?;
        envelope.into_data()
    }

    /// The state trail of one order, newest first.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`order_book`](Self::order_book).
    pub async fn order_history(
        &self,
        order_number: &str,
    ) -> Result<Vec<OrderBookEntry>, ApiError> {
        let credential = self.session.require_trade_authenticated()?;
        let body = RequestBody::trading_form(&OrderHistoryRequest { order_number })
            .map_err(ApiError::Transport)?;
        let request = self
            .trading_request(ORDER_HISTORY_PATH, &credential)?
            .body(body);

        let envelope: Envelope<Vec<OrderBookEntry>> =
            send_authenticated(&self.session, &self.transport, request).await?;
        envelope.into_data()
    }

    /// Every fill executed today.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`order_book`](Self::order_book).
    pub async fn trade_report(&self) -> Result<Vec<TradeReportEntry>, ApiError> {
        let credential = self.session.require_trade_authenticated()?;
        let request = apply_server_id(
            apply_auth_headers(
                ApiRequest::new(
                    Method::GET,
                    format!("{}/{TRADE_REPORT_PATH}", self.rest_base_url),
                ),
                &credential,
                self.session.consumer_key(),
            )?,
            &credential,
        );

        let envelope: Envelope<Vec<TradeReportEntry>> =
            send_authenticated(&self.session, &self.transport, request).await?;
        envelope.into_data()
    }

    /// POST skeleton for a trading call: headers plus server pin.
    fn trading_request(
        &self,
        path: &str,
        credential: &Credential,
    ) -> Result<ApiRequest, ApiError> {
        let request = ApiRequest::new(Method::POST, format!("{}/{path}", self.rest_base_url));
        let request = apply_auth_headers(request, credential, self.session.consumer_key())?;
        Ok(apply_server_id(request, credential))
    }
}

fn require_ok(response: OrderResponse) -> Result<OrderResponse, ApiError> {
    if response.is_ok() {
        Ok(response)
    } else {
        Err(ApiError::Rejected {
            code: response.status_code,
            message: response
                .error_message
                .unwrap_or_else(|| "order rejected".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit_buy() -> OrderRequest {
        OrderRequest::new(
            ExchangeSegment::NseCm,
            "RELIANCE-EQ",
            TransactionType::Buy,
            Product::Mis,
            OrderType::Limit,
            10,
        )
        .with_price(Decimal::new(150_000, 2))
    }

    #[test]
    fn order_request_wire_shape() {
        let json = serde_json::to_string(&limit_buy()).unwrap();
        assert_eq!(
            json,
            r#"{"am":"NO","dq":"0","es":"nse_cm","mp":"0","pc":"MIS","pf":"N","pr":"1500.00","pt":"L","qt":"10","rt":"DAY","tp":"0","ts":"RELIANCE-EQ","tt":"B"}"#
        );
    }

    #[test]
    fn order_request_validates() {
        assert!(limit_buy().validate().is_ok());

        let mut zero_quantity = limit_buy();
        zero_quantity.quantity = 0;
        assert!(matches!(
            zero_quantity.validate(),
            Err(ValidationError::OutOfRange { field: "qt", .. })
        ));

        let unpriced_limit = OrderRequest::new(
            ExchangeSegment::NseCm,
            "RELIANCE-EQ",
            TransactionType::Buy,
            Product::Mis,
            OrderType::Limit,
            10,
        );
        assert!(matches!(
            unpriced_limit.validate(),
            Err(ValidationError::OutOfRange { field: "pr", .. })
        ));

        let untriggered_stop = OrderRequest::new(
            ExchangeSegment::NseFo,
            "NIFTY26AUG24800CE",
            TransactionType::Sell,
            Product::Normal,
            OrderType::StopLossMarket,
            50,
        );
        assert!(matches!(
            untriggered_stop.validate(),
            Err(ValidationError::OutOfRange { field: "tp", .. })
        ));

        let over_disclosed = limit_buy().with_disclosed_quantity(11);
        assert!(matches!(
            over_disclosed.validate(),
            Err(ValidationError::OutOfRange { field: "dq", .. })
        ));
    }

    #[test]
    fn market_order_needs_no_price() {
        let market = OrderRequest::new(
            ExchangeSegment::NseCm,
            "TCS-EQ",
            TransactionType::Sell,
            Product::Cnc,
            OrderType::Market,
            5,
        );
        assert!(market.validate().is_ok());
    }

    #[test]
    fn modify_request_requires_order_number() {
        let modify = ModifyOrderRequest::new(
            "",
            ExchangeSegment::NseCm,
            "RELIANCE-EQ",
            TransactionType::Buy,
            OrderType::Market,
            10,
        );
        assert!(matches!(
            modify.validate(),
            Err(ValidationError::OutOfRange { field: "no", .. })
        ));
    }

    #[test]
    fn cancel_request_wire_shape() {
        let cancel = CancelOrderRequest::new("230825000012345");
        let json = serde_json::to_string(&cancel).unwrap();
        assert_eq!(json, r#"{"on":"230825000012345","am":"NO"}"#);
    }

    #[test]
    fn test_deserialize_order_response() {
        let json = r#"{"stat": "Ok", "nOrdNo": "230615000012345", "stCode": 200}"#;
        let response: OrderResponse = serde_json::from_str(json).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.order_number.as_deref(), Some("230615000012345"));
        assert!(require_ok(response).is_ok());
    }

    #[test]
    fn rejected_response_becomes_error() {
        let json = r#"{"stat": "Not_Ok", "stCode": 5001, "errMsg": "insufficient margin"}"#;
        let response: OrderResponse = serde_json::from_str(json).unwrap();
        assert!(!response.is_ok());

        match require_ok(response) {
            Err(ApiError::Rejected { code, message }) => {
                assert_eq!(code, Some(5001));
                assert_eq!(message, "insufficient margin");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_order_book_entry() {
        let json = r#"{
            "nOrdNo": "230825000012345",
            "ordSt": "open",
            "trdSym": "RELIANCE-EQ",
            "exSeg": "nse_cm",
            "prod": "MIS",
            "prcTp": "L",
            "trnsTp": "B",
            "qty": 10,
            "fldQty": 0,
            "prc": "1500.00",
            "ordDtTm": "25-Aug-2026 09:30:01"
        }"#;
        let entry: OrderBookEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.order_number, "230825000012345");
        assert_eq!(entry.status.as_deref(), Some("open"));
        assert_eq!(entry.price, Some(Decimal::new(150_000, 2)));
        assert!(entry.rejection_reason.is_none());
    }

    #[test]
    fn test_deserialize_trade_report_entry() {
        let json = r#"{
            "nOrdNo": "230825000012345",
            "flId": "88231",
            "trdSym": "RELIANCE-EQ",
            "exSeg": "nse_cm",
            "trnsTp": "B",
            "fldQty": 10,
            "avgPrc": 1499.85,
            "exTm": "25-Aug-2026 09:30:04"
        }"#;
        let entry: TradeReportEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.fill_id.as_deref(), Some("88231"));
        assert_eq!(entry.filled_quantity, Some(10));
        assert_eq!(entry.price, Some(Decimal::new(149_985, 2)));
    }
}
