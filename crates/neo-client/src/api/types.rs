//! Typed Wire Vocabulary
//!
//! Enums for the values the trading gateway accepts in order and quote
//! requests, each carrying its exact wire string. Parsing rejects
//! unknown values with [`ValidationError::UnknownEnumValue`] before any
//! network I/O happens.

use serde::{Deserialize, Serialize};

// =============================================================================
// Error Type
// =============================================================================

/// Pre-flight validation failure raised by the endpoint layer.
///
/// Requests failing validation never reach the transport, so none of
/// these are ever retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A numeric field is outside its permitted range.
    #[error("{field} out of range: {message}")]
    OutOfRange {
        /// Field that failed the bound check.
        field: &'static str,
        /// What the bound is and what was provided.
        message: String,
    },

    /// A string does not name a known wire value.
    #[error("unknown {kind} value: {value:?}")]
    UnknownEnumValue {
        /// Which enum was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}

// =============================================================================
// Exchange Segment
// =============================================================================

/// Exchange segment an instrument trades on.
///
/// The wire names double as the left half of the `"segment|token"`
/// composite used by the quote API and the stream subscription index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeSegment {
    /// NSE cash market (equities).
    #[serde(rename = "nse_cm")]
    NseCm,
    /// NSE futures and options.
    #[serde(rename = "nse_fo")]
    NseFo,
    /// NSE currency derivatives.
    #[serde(rename = "nse_cd")]
    NseCd,
    /// BSE cash market (equities).
    #[serde(rename = "bse_cm")]
    BseCm,
    /// BSE futures and options.
    #[serde(rename = "bse_fo")]
    BseFo,
    /// BSE currency derivatives.
    #[serde(rename = "bse_cd")]
    BseCd,
    /// Currency derivatives exchange futures and options.
    #[serde(rename = "cde_fo")]
    CdeFo,
    /// MCX commodity futures and options.
    #[serde(rename = "mcx_fo")]
    McxFo,
    /// NCDEX commodity futures and options.
    #[serde(rename = "ncx_fo")]
    NcxFo,
    /// NSE commodity segment.
    #[serde(rename = "nse_com")]
    NseCom,
}

impl ExchangeSegment {
    /// Every segment the gateway recognizes.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::NseCm,
            Self::NseFo,
            Self::NseCd,
            Self::BseCm,
            Self::BseFo,
            Self::BseCd,
            Self::CdeFo,
            Self::McxFo,
            Self::NcxFo,
            Self::NseCom,
        ]
    }

    /// The wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NseCm => "nse_cm",
            Self::NseFo => "nse_fo",
            Self::NseCd => "nse_cd",
            Self::BseCm => "bse_cm",
            Self::BseFo => "bse_fo",
            Self::BseCd => "bse_cd",
            Self::CdeFo => "cde_fo",
            Self::McxFo => "mcx_fo",
            Self::NcxFo => "ncx_fo",
            Self::NseCom => "nse_com",
        }
    }

    /// Parse a wire name, case-insensitively.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownEnumValue`] for anything not in the
    /// gateway's segment list.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.to_lowercase().as_str() {
            "nse_cm" => Ok(Self::NseCm),
            "nse_fo" => Ok(Self::NseFo),
            "nse_cd" => Ok(Self::NseCd),
            "bse_cm" => Ok(Self::BseCm),
            "bse_fo" => Ok(Self::BseFo),
            "bse_cd" => Ok(Self::BseCd),
            "cde_fo" => Ok(Self::CdeFo),
            "mcx_fo" => Ok(Self::McxFo),
            "ncx_fo" => Ok(Self::NcxFo),
            "nse_com" => Ok(Self::NseCom),
            _ => Err(ValidationError::UnknownEnumValue {
                kind: "exchange segment",
                value: value.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ExchangeSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order Enums
// =============================================================================

/// Buy or sell, as the `tt` order field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Buy.
    #[serde(rename = "B")]
    Buy,
    /// Sell.
    #[serde(rename = "S")]
    Sell,
}

impl TransactionType {
    /// The wire code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "B",
            Self::Sell => "S",
        }
    }

    /// Parse a wire code or spelled-out name, case-insensitively.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownEnumValue`] for anything other than
    /// `B`/`BUY`/`S`/`SELL`.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.to_uppercase().as_str() {
            "B" | "BUY" => Ok(Self::Buy),
            "S" | "SELL" => Ok(Self::Sell),
            _ => Err(ValidationError::UnknownEnumValue {
                kind: "transaction type",
                value: value.to_string(),
            }),
        }
    }
}

/// Product the order books under, as the `pc` order field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Product {
    /// Cash and carry (delivery).
    #[serde(rename = "CNC")]
    Cnc,
    /// Margin intraday squareoff.
    #[serde(rename = "MIS")]
    Mis,
    /// Normal (carry-forward derivatives).
    #[serde(rename = "NRML")]
    Normal,
    /// Cover order.
    #[serde(rename = "CO")]
    CoverOrder,
    /// Bracket order.
    #[serde(rename = "BO")]
    BracketOrder,
}

impl Product {
    /// The wire code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cnc => "CNC",
            Self::Mis => "MIS",
            Self::Normal => "NRML",
            Self::CoverOrder => "CO",
            Self::BracketOrder => "BO",
        }
    }

    /// Parse a wire code, case-insensitively.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownEnumValue`] for unknown product codes.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.to_uppercase().as_str() {
            "CNC" => Ok(Self::Cnc),
            "MIS" => Ok(Self::Mis),
            "NRML" => Ok(Self::Normal),
            "CO" => Ok(Self::CoverOrder),
            "BO" => Ok(Self::BracketOrder),
            _ => Err(ValidationError::UnknownEnumValue {
                kind: "product",
                value: value.to_string(),
            }),
        }
    }
}

/// Price mechanism for the order, as the `pt` order field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Limit order; requires a price.
    #[serde(rename = "L")]
    Limit,
    /// Market order; price ignored.
    #[serde(rename = "MKT")]
    Market,
    /// Stop-loss limit order; requires price and trigger.
    #[serde(rename = "SL")]
    StopLoss,
    /// Stop-loss market order; requires a trigger.
    #[serde(rename = "SL-M")]
    StopLossMarket,
}

impl OrderType {
    /// The wire code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Limit => "L",
            Self::Market => "MKT",
            Self::StopLoss => "SL",
            Self::StopLossMarket => "SL-M",
        }
    }

    /// Whether this order type carries a limit price.
    #[must_use]
    pub const fn has_price(&self) -> bool {
        matches!(self, Self::Limit | Self::StopLoss)
    }

    /// Whether this order type carries a trigger price.
    #[must_use]
    pub const fn has_trigger(&self) -> bool {
        matches!(self, Self::StopLoss | Self::StopLossMarket)
    }

    /// Parse a wire code, case-insensitively.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownEnumValue`] for unknown order types.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.to_uppercase().as_str() {
            "L" => Ok(Self::Limit),
            "MKT" => Ok(Self::Market),
            "SL" => Ok(Self::StopLoss),
            "SL-M" => Ok(Self::StopLossMarket),
            _ => Err(ValidationError::UnknownEnumValue {
                kind: "order type",
                value: value.to_string(),
            }),
        }
    }
}

/// How long the order stays live, as the `rt` order field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Validity {
    /// Valid for the trading day.
    #[serde(rename = "DAY")]
    Day,
    /// Immediate or cancel.
    #[serde(rename = "IOC")]
    Ioc,
}

impl Validity {
    /// The wire code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "DAY",
            Self::Ioc => "IOC",
        }
    }

    /// Parse a wire code, case-insensitively.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownEnumValue`] for unknown validities.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.to_uppercase().as_str() {
            "DAY" => Ok(Self::Day),
            "IOC" => Ok(Self::Ioc),
            _ => Err(ValidationError::UnknownEnumValue {
                kind: "validity",
                value: value.to_string(),
            }),
        }
    }
}

// =============================================================================
// Quote Type
// =============================================================================

/// Which slice of quote data to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QuoteType {
    /// Everything the gateway has for the instrument.
    #[default]
    #[serde(rename = "all")]
    All,
    /// Last traded price only.
    #[serde(rename = "ltp")]
    Ltp,
    /// Open, high, low, close.
    #[serde(rename = "ohlc")]
    Ohlc,
    /// Full market depth.
    #[serde(rename = "depth")]
    Depth,
    /// 52-week high and low.
    #[serde(rename = "52w")]
    Week52,
    /// Circuit limit bands.
    #[serde(rename = "circuit_limits")]
    CircuitLimits,
}

impl QuoteType {
    /// The wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Ltp => "ltp",
            Self::Ohlc => "ohlc",
            Self::Depth => "depth",
            Self::Week52 => "52w",
            Self::CircuitLimits => "circuit_limits",
        }
    }

    /// Parse a wire name, case-insensitively.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnknownEnumValue`] for unknown quote types.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "ltp" => Ok(Self::Ltp),
            "ohlc" => Ok(Self::Ohlc),
            "depth" => Ok(Self::Depth),
            "52w" => Ok(Self::Week52),
            "circuit_limits" => Ok(Self::CircuitLimits),
            _ => Err(ValidationError::UnknownEnumValue {
                kind: "quote type",
                value: value.to_string(),
            }),
        }
    }
}
