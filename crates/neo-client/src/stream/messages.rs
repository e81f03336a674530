//! Stream Wire Message Types
//!
//! Wire format types for the gateway's market data WebSocket. Inbound
//! frames are tagged JSON objects discriminated by a `type` field;
//! outbound messages carry the same discriminant plus a `scrips` list
//! of `"segment|token"` composites.
//!
//! # Inbound Frame Kinds
//! - `ack`: handshake and subscription acknowledgments
//! - `data`: batched tick items
//! - `order`: order lifecycle update
//! - `heartbeat`: server liveness marker
//! - `error`: gateway-reported fault
//!
//! # Outbound Messages
//! - [`ConnectionRequest`]: post-connect handshake with session tokens
//! - [`SubscribeMessage`]: subscribe/unsubscribe with feed flags

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::router::{SubscriptionKey, composite_key};
use crate::api::types::ExchangeSegment;

// =============================================================================
// Inbound Frames (Server -> Client)
// =============================================================================

/// One inbound frame, discriminated by its `type` field.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "ack", "stat": "Ok", "msg": "connected"}
/// {"type": "data", "data": [{"e": "nse_cm", "tk": "11536", "ltp": "2450.50"}]}
/// {"type": "order", "nOrdNo": "230825000012345", "ordSt": "complete"}
/// {"type": "heartbeat"}
/// {"type": "error", "code": 401, "msg": "invalid token"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamFrame {
    /// Handshake or subscription acknowledgment.
    Ack(AckFrame),
    /// Batch of tick items.
    Data(DataFrame),
    /// Order lifecycle update.
    Order(Box<OrderUpdate>),
    /// Server liveness marker; carries no payload.
    Heartbeat,
    /// Gateway-reported fault.
    Error(ErrorFrame),
}

/// Acknowledgment payload.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "ack", "stat": "Ok", "msg": "connected"}
/// {"type": "ack", "stat": "NotOk", "msg": "session invalid"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckFrame {
    /// Gateway status: `"Ok"` on success, `"NotOk"` on rejection.
    pub stat: String,

    /// Human-readable detail, when the gateway provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl AckFrame {
    /// Whether the gateway accepted the request this acknowledges.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.stat.eq_ignore_ascii_case("ok")
    }
}

/// Gateway fault payload.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "error", "code": 401, "msg": "invalid token"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Gateway error code, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,

    /// Error description.
    pub msg: String,
}

/// Batch of tick items carried by one `data` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    /// Tick items in gateway order.
    pub data: Vec<TickItem>,
}

/// One market data tick.
///
/// Unknown instruments arrive on shared gateway connections; the
/// dispatch loop drops items whose [`routing_key`](Self::routing_key)
/// is not subscribed. Prices deserialize from either JSON numbers or
/// strings, matching the gateway's mixed encoding.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "e": "nse_cm",
///   "tk": "11536",
///   "ltp": "2450.50",
///   "bp": 2450.25,
///   "ap": 2450.75,
///   "v": 1520000,
///   "ft": "1687261834"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickItem {
    /// Exchange segment wire name, e.g. `"nse_cm"`.
    #[serde(rename = "e")]
    pub exchange_segment: String,

    /// Instrument token, e.g. `"11536"`.
    #[serde(rename = "tk")]
    pub instrument_token: String,

    /// Last traded price.
    #[serde(rename = "ltp", default, skip_serializing_if = "Option::is_none")]
    pub last_price: Option<Decimal>,

    /// Best bid price.
    #[serde(rename = "bp", default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<Decimal>,

    /// Best ask price.
    #[serde(rename = "ap", default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<Decimal>,

    /// Cumulative traded volume.
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<i64>,

    /// Feed timestamp as epoch seconds, passed through verbatim.
    #[serde(rename = "ft", default, skip_serializing_if = "Option::is_none")]
    pub feed_time: Option<String>,
}

impl TickItem {
    /// The `"segment|token"` composite this tick routes on.
    #[must_use]
    pub fn routing_key(&self) -> String {
        format!("{}|{}", self.exchange_segment, self.instrument_token)
    }
}

/// Order lifecycle update pushed by the gateway.
///
/// Every field except the order number is optional; the gateway omits
/// whatever does not apply to the event.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "type": "order",
///   "nOrdNo": "230825000012345",
///   "ordSt": "complete",
///   "trdSym": "RELIANCE-EQ",
///   "exSeg": "nse_cm",
///   "tt": "B",
///   "qty": 10,
///   "fldQty": 10,
///   "prc": "1500.00",
///   "avgPrc": "1499.85"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    /// Exchange order number.
    #[serde(rename = "nOrdNo")]
    pub order_number: String,

    /// Order status, e.g. `"open"`, `"complete"`, `"rejected"`.
    #[serde(rename = "ordSt", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Trading symbol, e.g. `"RELIANCE-EQ"`.
    #[serde(rename = "trdSym", default, skip_serializing_if = "Option::is_none")]
    pub trading_symbol: Option<String>,

    /// Exchange segment wire name.
    #[serde(rename = "exSeg", default, skip_serializing_if = "Option::is_none")]
    pub exchange_segment: Option<String>,

    /// Transaction type wire code, `"B"` or `"S"`.
    #[serde(rename = "tt", default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,

    /// Ordered quantity.
    #[serde(rename = "qty", default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,

    /// Filled quantity so far.
    #[serde(rename = "fldQty", default, skip_serializing_if = "Option::is_none")]
    pub filled_quantity: Option<i64>,

    /// Order price.
    #[serde(rename = "prc", default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,

    /// Average fill price.
    #[serde(rename = "avgPrc", default, skip_serializing_if = "Option::is_none")]
    pub average_price: Option<Decimal>,

    /// Rejection reason when status is `"rejected"`.
    #[serde(rename = "rejRsn", default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

// =============================================================================
// Outbound Messages (Client -> Server)
// =============================================================================

/// Post-connect handshake carrying the session tokens.
///
/// Sent as the first message after the socket opens; the gateway
/// answers with an `ack` frame.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "connect", "token": "<view_token>", "sid": "<session_id>"}
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionRequest {
    /// Discriminant: always `"connect"`.
    #[serde(rename = "type")]
    pub msg_type: &'static str,

    /// View token from the login step.
    pub token: String,

    /// Session id from the login step.
    pub sid: String,
}

impl ConnectionRequest {
    /// Handshake for the given session tokens.
    #[must_use]
    pub const fn new(token: String, sid: String) -> Self {
        Self {
            msg_type: "connect",
            token,
            sid,
        }
    }
}

/// Subscribe or unsubscribe request for a batch of instruments.
///
/// The gateway applies `index`/`depth` to every scrip in the message,
/// so [`subscribe`](Self::subscribe) groups keys by their flag pair and
/// emits one message per group.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "type": "subscribe",
///   "scrips": ["nse_cm|11536", "nse_fo|53216"],
///   "index": false,
///   "depth": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeMessage {
    /// Discriminant: `"subscribe"` or `"unsubscribe"`.
    #[serde(rename = "type")]
    pub msg_type: &'static str,

    /// `"segment|token"` composites, sorted.
    pub scrips: Vec<String>,

    /// Request index feed frames.
    pub index: bool,

    /// Request full market depth frames.
    pub depth: bool,
}

impl SubscribeMessage {
    /// Subscribe messages for `keys`, one per distinct flag pair.
    #[must_use]
    pub fn subscribe(keys: &[SubscriptionKey]) -> Vec<Self> {
        Self::grouped("subscribe", keys)
    }

    /// Unsubscribe messages for `keys`, one per distinct flag pair.
    #[must_use]
    pub fn unsubscribe(keys: &[SubscriptionKey]) -> Vec<Self> {
        Self::grouped("unsubscribe", keys)
    }

    fn grouped(msg_type: &'static str, keys: &[SubscriptionKey]) -> Vec<Self> {
        // BTreeMap keeps group order stable across calls.
        let mut groups: BTreeMap<(bool, bool), Vec<String>> = BTreeMap::new();
        for key in keys {
            groups
                .entry((key.index, key.depth))
                .or_default()
                .push(key.composite());
        }

        groups
            .into_iter()
            .map(|((index, depth), mut scrips)| {
                scrips.sort();
                Self {
                    msg_type,
                    scrips,
                    index,
                    depth,
                }
            })
            .collect()
    }

    /// Single-instrument subscribe, for callers that do not batch.
    #[must_use]
    pub fn single(segment: ExchangeSegment, token: &str) -> Self {
        Self {
            msg_type: "subscribe",
            scrips: vec![composite_key(segment, token)],
            index: false,
            depth: false,
        }
    }
}
