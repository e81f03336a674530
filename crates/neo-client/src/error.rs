//! Error Taxonomy
//!
//! Every failure mode lives next to the layer that raises it. This
//! module gathers the per-layer error enums in one place so callers
//! can match on any of them with a single import.
//!
//! - [`ConfigError`]: invalid or missing configuration at startup
//! - [`ValidationError`]: a request rejected before it reaches the wire
//! - [`AuthError`]: login, 2FA, and session-lifecycle failures
//! - [`TransportError`]: HTTP failures after retry classification
//! - [`ApiError`]: endpoint-level failures, including broker rejections
//! - [`StreamError`]: WebSocket handshake and connection failures

pub use crate::api::{ApiError, ValidationError};
pub use crate::config::ConfigError;
pub use crate::session::AuthError;
pub use crate::stream::StreamError;
pub use crate::transport::TransportError;
