//! Market Data Streaming
//!
//! Live market data over the gateway's WebSocket feed:
//!
//! - **Router**: tracks subscriptions and answers tick relevance
//!   lock-free on the hot path
//! - **Messages**: the tagged JSON wire frames, inbound and outbound
//! - **Connection**: managed socket with handshake, heartbeat
//!   watchdog, subscription replay, and reconnection

pub mod connection;
pub mod messages;
pub mod router;

pub use connection::{StreamConnection, StreamConnectionState, StreamError, StreamHandler};
pub use messages::{
    AckFrame, ConnectionRequest, DataFrame, ErrorFrame, OrderUpdate, StreamFrame,
    SubscribeMessage, TickItem,
};
pub use router::{SubscriptionKey, SubscriptionRouter, composite_key};
