#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::significant_drop_tightening
    )
)]

//! Neo API Client - Kotak Neo Trading API
//!
//! An async client for the Kotak Neo brokerage API: TOTP-based session
//! management, a retrying HTTP transport, order and portfolio
//! endpoints, and live market-data streaming over WebSocket.
//!
//! # Components
//!
//! - **Session**: authentication and token lifecycle
//!   - `config`: environments, credentials, and client tunables
//!   - `session`: the login/2FA state machine and session gates
//!
//! - **Transport**: HTTP plumbing shared by every endpoint
//!   - `transport`: pooled client with classified, bounded retry
//!   - `retry`: the backoff policy and jittered delay schedule
//!
//! - **API**: typed REST endpoints
//!   - `api::orders`: place, modify, cancel, and the reports
//!   - `api::portfolio`: positions, holdings, margin limits
//!   - `api::quotes`: batched market quotes
//!
//! - **Stream**: live market data
//!   - `stream::connection`: WebSocket lifecycle and reconnection
//!   - `stream::router`: subscription bookkeeping and tick filtering
//!   - `stream::messages`: the JSON wire frames, both directions
//!
//! # Data Flow
//!
//! ```text
//!                ┌─────────────────┐
//! TOTP login ───►│ SessionManager  │
//!                └────────┬────────┘
//!                         │ session tokens
//!             ┌───────────┴────────────┐
//!             ▼                        ▼
//!   ┌─────────────────┐      ┌─────────────────┐
//!   │ OrderApi        │      │ StreamConnection│◄──► WebSocket feed
//!   │ PortfolioApi    │      └────────┬────────┘
//!   │ QuoteApi        │               │ ticks, order updates
//!   └────────┬────────┘               ▼
//!            │ HTTPS            StreamHandler
//!            ▼
//!   ┌─────────────────┐
//!   │ TransportClient │────► REST gateway
//!   │ (bounded retry) │
//!   └─────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Typed REST endpoints - orders, portfolio, and quotes.
pub mod api;

/// Environments, credentials, and client tunables.
pub mod config;

/// One-stop re-exports of every per-layer error type.
pub mod error;

/// Retry classification and exponential backoff with jitter.
pub mod retry;

/// Authentication state machine and session token lifecycle.
pub mod session;

/// Live market-data streaming over WebSocket.
pub mod stream;

/// Pooled HTTP transport with bounded, classified retry.
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

// Configuration
pub use config::{
    ConfigError, ConsumerCredentials, Environment, NeoConfig, StreamSettings, TransportSettings,
};

// Session lifecycle
pub use session::{AuthError, Credential, SessionManager, SessionState};

// Transport
pub use transport::{ApiRequest, RequestBody, TransportClient, TransportError};

// Retry policy
pub use retry::{ExponentialBackoff, RetryPolicy};

// REST endpoints
pub use api::{
    ApiError, CancelOrderRequest, ExchangeSegment, Holding, MarginLimits, ModifyOrderRequest,
    OrderApi, OrderBookEntry, OrderRequest, OrderResponse, OrderType, PortfolioApi, Position,
    Product, Quote, QuoteApi, QuoteInstrument, QuoteType, TradeReportEntry, TransactionType,
    ValidationError, Validity,
};

// Streaming
pub use stream::{
    StreamConnection, StreamConnectionState, StreamError, StreamHandler, SubscriptionKey,
    SubscriptionRouter,
};

// Stream wire frames (for integration tests)
pub use stream::{OrderUpdate, StreamFrame, TickItem};
