//! Client Configuration
//!
//! Configuration types for the Neo API client, loadable from environment
//! variables.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Header value identifying the trading API channel.
pub const NEO_FIN_KEY: &str = "neotradeapi";

/// Broker environment (UAT sandbox vs production).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// UAT sandbox environment (test gateway).
    #[default]
    Uat,
    /// Production environment (real money).
    Prod,
}

impl Environment {
    /// Parse environment from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            _ => Self::Uat,
        }
    }

    /// Check if this is the production environment.
    #[must_use]
    pub const fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Uat => "uat",
            Self::Prod => "prod",
        }
    }

    /// Base URL of the REST API gateway.
    #[must_use]
    pub const fn rest_base_url(&self) -> &'static str {
        match self {
            Self::Uat => "https://gw-nuat.kotaksecurities.com",
            Self::Prod => "https://gw-napi.kotaksecurities.com",
        }
    }

    /// Base URL of the session-init gateway (TOTP login and validate).
    #[must_use]
    pub const fn session_base_url(&self) -> &'static str {
        // Session init rides the same gateway today; kept separate so the
        // two hosts can diverge without touching callers.
        match self {
            Self::Uat => "https://gw-nuat.kotaksecurities.com",
            Self::Prod => "https://gw-napi.kotaksecurities.com",
        }
    }

    /// WebSocket URL of the market-data stream.
    #[must_use]
    pub const fn stream_url(&self) -> &'static str {
        match self {
            Self::Uat => "wss://mlhsm-uat.kotaksecurities.com",
            Self::Prod => "wss://mlhsm.kotaksecurities.com",
        }
    }
}

/// Consumer application identity issued by the broker.
#[derive(Clone)]
pub struct ConsumerCredentials {
    consumer_key: String,
    consumer_secret: String,
}

impl ConsumerCredentials {
    /// Create new consumer credentials.
    #[must_use]
    pub const fn new(consumer_key: String, consumer_secret: String) -> Self {
        Self {
            consumer_key,
            consumer_secret,
        }
    }

    /// Get the consumer key (sent as the `Authorization` header).
    #[must_use]
    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// Get the consumer secret.
    ///
    /// Not sent on any wire call in this crate; the session endpoints
    /// authenticate with the consumer key alone. The secret completes
    /// the identity pair the broker issues and is held for its
    /// out-of-band token-issuance flows.
    #[must_use]
    pub fn consumer_secret(&self) -> &str {
        &self.consumer_secret
    }
}

impl std::fmt::Debug for ConsumerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerCredentials")
            .field("consumer_key", &"[REDACTED]")
            .field("consumer_secret", &"[REDACTED]")
            .finish()
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Per-attempt request timeout.
    pub request_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Maximum idle pooled connections kept per host.
    pub pool_max_idle_per_host: usize,
    /// How long an idle pooled connection is kept alive.
    pub pool_idle_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            pool_max_idle_per_host: 20,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

/// WebSocket stream settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Idle window without any inbound frame before the connection is
    /// treated as dead and reconnected.
    pub idle_timeout: Duration,
    /// Outbound ping interval while connected.
    pub ping_interval: Duration,
    /// Backoff schedule between reconnect attempts.
    pub reconnect: RetryPolicy,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Capacity of the handler dispatch channel.
    pub dispatch_capacity: usize,
    /// Consecutive malformed frames tolerated before the connection is
    /// torn down and reconnected.
    pub protocol_violation_threshold: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            ping_interval: Duration::from_secs(10),
            reconnect: RetryPolicy::default(),
            max_reconnect_attempts: 0, // Unlimited
            dispatch_capacity: 10_000,
            protocol_violation_threshold: 5,
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct NeoConfig {
    /// Broker environment.
    pub environment: Environment,
    /// Consumer application identity.
    pub credentials: ConsumerCredentials,
    /// HTTP transport settings.
    pub transport: TransportSettings,
    /// Retry policy applied by the HTTP transport.
    pub retry: RetryPolicy,
    /// WebSocket stream settings.
    pub stream: StreamSettings,
}

impl NeoConfig {
    /// Create a configuration with default tuning for the given identity
    /// and environment.
    #[must_use]
    pub fn new(credentials: ConsumerCredentials, environment: Environment) -> Self {
        Self {
            environment,
            credentials,
            transport: TransportSettings::default(),
            retry: RetryPolicy::default(),
            stream: StreamSettings::default(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or
    /// empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let consumer_key = std::env::var("NEO_CONSUMER_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("NEO_CONSUMER_KEY".to_string()))?;

        let consumer_secret = std::env::var("NEO_CONSUMER_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("NEO_CONSUMER_SECRET".to_string()))?;

        if consumer_key.is_empty() {
            return Err(ConfigError::EmptyValue("NEO_CONSUMER_KEY".to_string()));
        }

        if consumer_secret.is_empty() {
            return Err(ConfigError::EmptyValue("NEO_CONSUMER_SECRET".to_string()));
        }

        let environment = std::env::var("NEO_ENVIRONMENT")
            .map(|s| Environment::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let transport = TransportSettings {
            request_timeout: parse_env_duration_secs(
                "NEO_REQUEST_TIMEOUT_SECS",
                TransportSettings::default().request_timeout,
            ),
            connect_timeout: parse_env_duration_secs(
                "NEO_CONNECT_TIMEOUT_SECS",
                TransportSettings::default().connect_timeout,
            ),
            pool_max_idle_per_host: parse_env_usize(
                "NEO_POOL_MAX_IDLE_PER_HOST",
                TransportSettings::default().pool_max_idle_per_host,
            ),
            pool_idle_timeout: parse_env_duration_secs(
                "NEO_POOL_IDLE_TIMEOUT_SECS",
                TransportSettings::default().pool_idle_timeout,
            ),
        };

        let retry = RetryPolicy {
            max_attempts: parse_env_u32(
                "NEO_RETRY_MAX_ATTEMPTS",
                RetryPolicy::default().max_attempts,
            ),
            base_backoff: parse_env_duration_millis(
                "NEO_RETRY_BASE_BACKOFF_MS",
                RetryPolicy::default().base_backoff,
            ),
            ..RetryPolicy::default()
        };

        let stream = StreamSettings {
            idle_timeout: parse_env_duration_secs(
                "NEO_STREAM_IDLE_TIMEOUT_SECS",
                StreamSettings::default().idle_timeout,
            ),
            ping_interval: parse_env_duration_secs(
                "NEO_STREAM_PING_INTERVAL_SECS",
                StreamSettings::default().ping_interval,
            ),
            max_reconnect_attempts: parse_env_u32(
                "NEO_STREAM_MAX_RECONNECT_ATTEMPTS",
                StreamSettings::default().max_reconnect_attempts,
            ),
            ..StreamSettings::default()
        };

        Ok(Self {
            environment,
            credentials: ConsumerCredentials::new(consumer_key, consumer_secret),
            transport,
            retry,
            stream,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing() {
        assert_eq!(
            Environment::from_str_case_insensitive("prod"),
            Environment::Prod
        );
        assert_eq!(
            Environment::from_str_case_insensitive("PROD"),
            Environment::Prod
        );
        assert_eq!(
            Environment::from_str_case_insensitive("production"),
            Environment::Prod
        );
        assert_eq!(
            Environment::from_str_case_insensitive("uat"),
            Environment::Uat
        );
        assert_eq!(
            Environment::from_str_case_insensitive("unknown"),
            Environment::Uat
        );
    }

    #[test]
    fn environment_is_prod() {
        assert!(Environment::Prod.is_prod());
        assert!(!Environment::Uat.is_prod());
    }

    #[test]
    fn environment_urls_differ_per_gateway() {
        assert!(Environment::Prod.rest_base_url().contains("gw-napi"));
        assert!(Environment::Uat.rest_base_url().contains("gw-nuat"));
        assert!(Environment::Prod.stream_url().starts_with("wss://"));
    }

    #[test]
    fn credentials_expose_the_issued_pair() {
        let creds = ConsumerCredentials::new("key123".to_string(), "secret456".to_string());
        assert_eq!(creds.consumer_key(), "key123");
        assert_eq!(creds.consumer_secret(), "secret456");
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = ConsumerCredentials::new("key123".to_string(), "secret456".to_string());
        let debug = format!("{creds:?}");
        assert!(!debug.contains("key123"));
        assert!(!debug.contains("secret456"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn transport_settings_defaults() {
        let settings = TransportSettings::default();
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.pool_max_idle_per_host, 20);
    }

    #[test]
    fn stream_settings_defaults() {
        let settings = StreamSettings::default();
        assert_eq!(settings.idle_timeout, Duration::from_secs(30));
        assert_eq!(settings.ping_interval, Duration::from_secs(10));
        assert_eq!(settings.max_reconnect_attempts, 0);
        assert_eq!(settings.protocol_violation_threshold, 5);
    }
}
