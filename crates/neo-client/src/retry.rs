//! Retry policy with exponential backoff for broker API calls.
//!
//! The policy is pure configuration: which failures may be retried, how
//! many tries are allowed, and how long to wait between them. The same
//! backoff schedule drives HTTP retries and WebSocket reconnects.
//!
//! Retry is restricted to idempotent HTTP methods by default. A retried
//! order placement can fill twice, so mutating methods are only retried
//! when a caller opts in explicitly via [`RetryPolicy::retry_method`].
//!
//! # Example
//!
//! ```rust,ignore
//! use neo_client::retry::{ExponentialBackoff, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! let mut backoff = ExponentialBackoff::new(&policy);
//!
//! let delay1 = backoff.next_backoff(); // ~250ms with jitter
//! let delay2 = backoff.next_backoff(); // ~500ms with jitter
//! ```

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use reqwest::Method;

/// Retry policy consulted by the HTTP transport and the stream
/// reconnect loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total tries per logical call, including the first (default: 3).
    pub max_attempts: u32,
    /// Delay before the first retry (default: 250ms).
    pub base_backoff: Duration,
    /// Multiplier applied to the delay on each further retry (default: 2.0).
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay (default: 30s).
    pub max_backoff: Duration,
    /// Proportional jitter applied to each delay, 0.0..=1.0 (default: 0.1).
    pub jitter_fraction: f64,
    /// HTTP status codes treated as transient.
    pub retryable_status_codes: HashSet<u16>,
    /// HTTP methods eligible for automatic retry.
    pub retryable_methods: HashSet<Method>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(250),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
            jitter_fraction: 0.1,
            retryable_status_codes: [408, 429, 500, 502, 503, 504].into_iter().collect(),
            retryable_methods: [Method::GET, Method::HEAD, Method::OPTIONS]
                .into_iter()
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy that never retries (single attempt per call).
    #[must_use]
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Opt a method into automatic retry.
    ///
    /// Retrying a non-idempotent method can double-submit an order; only
    /// opt in methods whose handlers are known to deduplicate.
    #[must_use]
    pub fn retry_method(mut self, method: Method) -> Self {
        self.retryable_methods.insert(method);
        self
    }

    /// Check whether a status code is classified as transient.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// Check whether a method is eligible for automatic retry.
    #[must_use]
    pub fn is_retryable_method(&self, method: &Method) -> bool {
        self.retryable_methods.contains(method)
    }
}

/// Calculator for exponential backoff with jitter.
///
/// The first attempt is immediate; the wait before attempt `k` (k > 1) is
/// `base_backoff * backoff_multiplier^(k-2)`, capped at `max_backoff`.
#[derive(Debug)]
pub struct ExponentialBackoff {
    waits_taken: u32,
    max_waits: Option<u32>,
    base_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
    jitter_fraction: f64,
}

impl ExponentialBackoff {
    /// Create a backoff calculator bounded by the policy's `max_attempts`.
    #[must_use]
    pub fn new(policy: &RetryPolicy) -> Self {
        Self::with_max_waits(policy, Some(policy.max_attempts.saturating_sub(1)))
    }

    /// Create an unbounded calculator (schedule shape only, no attempt
    /// limit). Used by the stream reconnect loop, which bounds attempts
    /// itself.
    #[must_use]
    pub fn unbounded(policy: &RetryPolicy) -> Self {
        Self::with_max_waits(policy, None)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn with_max_waits(policy: &RetryPolicy, max_waits: Option<u32>) -> Self {
        Self {
            waits_taken: 0,
            max_waits,
            base_backoff_ms: policy.base_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter_fraction: policy.jitter_fraction,
        }
    }

    /// Get the wait before the next attempt.
    ///
    /// Returns `None` once the policy's attempts are exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_waits {
            if self.waits_taken >= max {
                return None;
            }
        }

        let base_ms = self.base_delay_ms();
        let jittered_ms = self.apply_jitter(base_ms);
        let capped_ms = jittered_ms.min(self.max_backoff_ms);

        self.waits_taken += 1;

        Some(Duration::from_millis(capped_ms))
    }

    /// Number of waits taken so far; attempt number is this plus one.
    #[must_use]
    pub const fn waits_taken(&self) -> u32 {
        self.waits_taken
    }

    /// Reset the schedule, e.g. after a connection is re-established.
    pub const fn reset(&mut self) {
        self.waits_taken = 0;
    }

    fn base_delay_ms(&self) -> u64 {
        #[allow(clippy::cast_possible_wrap)]
        let multiplier = self.backoff_multiplier.powi(self.waits_taken as i32);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = (self.base_backoff_ms as f64 * multiplier) as u64;
        delay.min(self.max_backoff_ms)
    }

    #[allow(clippy::cast_precision_loss)]
    fn apply_jitter(&self, delay_ms: u64) -> u64 {
        if self.jitter_fraction <= 0.0 {
            return delay_ms;
        }

        let mut rng = rand::rng();
        let jitter_range = delay_ms as f64 * self.jitter_fraction;
        let min = (delay_ms as f64 - jitter_range).max(0.0);
        let max = delay_ms as f64 + jitter_range;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jittered = rng.random_range(min..=max) as u64;
        jittered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn jitterless() -> RetryPolicy {
        RetryPolicy {
            jitter_fraction: 0.0,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_backoff, Duration::from_millis(250));
        assert_eq!(policy.max_backoff, Duration::from_secs(30));
        assert!((policy.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert!((policy.jitter_fraction - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn default_policy_excludes_mutating_methods() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable_method(&Method::GET));
        assert!(policy.is_retryable_method(&Method::HEAD));
        assert!(policy.is_retryable_method(&Method::OPTIONS));
        assert!(!policy.is_retryable_method(&Method::POST));
        assert!(!policy.is_retryable_method(&Method::PUT));
        assert!(!policy.is_retryable_method(&Method::DELETE));
    }

    #[test]
    fn retry_method_opts_in() {
        let policy = RetryPolicy::default().retry_method(Method::POST);
        assert!(policy.is_retryable_method(&Method::POST));
        // Opt-in is additive, not a replacement
        assert!(policy.is_retryable_method(&Method::GET));
    }

    #[test_case(408, true; "request timeout")]
    #[test_case(429, true; "rate limited")]
    #[test_case(500, true; "internal server error")]
    #[test_case(502, true; "bad gateway")]
    #[test_case(503, true; "service unavailable")]
    #[test_case(504, true; "gateway timeout")]
    #[test_case(400, false; "bad request")]
    #[test_case(401, false; "unauthorized")]
    #[test_case(404, false; "not found")]
    #[test_case(422, false; "unprocessable")]
    #[test_case(501, false; "not implemented")]
    fn status_classification(status: u16, retryable: bool) {
        assert_eq!(RetryPolicy::default().is_retryable_status(status), retryable);
    }

    #[test]
    fn exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(&RetryPolicy {
            max_attempts: 4,
            ..jitterless()
        });

        // Without jitter: 250ms, 500ms, 1000ms, then exhausted
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(250)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(500)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(1000)));
        assert!(backoff.next_backoff().is_none());
    }

    #[test]
    fn max_attempts_bounds_waits() {
        // max_attempts=3 allows exactly two waits (attempts 2 and 3)
        let mut backoff = ExponentialBackoff::new(&jitterless());
        assert!(backoff.next_backoff().is_some());
        assert!(backoff.next_backoff().is_some());
        assert!(backoff.next_backoff().is_none());
        assert_eq!(backoff.waits_taken(), 2);
    }

    #[test]
    fn single_attempt_policy_never_waits() {
        let mut backoff = ExponentialBackoff::new(&RetryPolicy {
            max_attempts: 1,
            ..jitterless()
        });
        assert!(backoff.next_backoff().is_none());
    }

    #[test]
    fn max_backoff_caps_delay() {
        let policy = RetryPolicy {
            max_attempts: 20,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 10.0,
            jitter_fraction: 0.0,
            ..RetryPolicy::default()
        };
        let mut backoff = ExponentialBackoff::new(&policy);

        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(5))); // Capped
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(5))); // Capped
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = RetryPolicy {
            jitter_fraction: 0.2,
            ..RetryPolicy::default()
        };

        for _ in 0..100 {
            let mut backoff = ExponentialBackoff::new(&policy);
            let duration = backoff.next_backoff().expect("first wait is available");

            // Base is 250ms, jitter is +/-20%, so range is 200-300ms
            assert!(
                duration >= Duration::from_millis(200) && duration <= Duration::from_millis(300),
                "duration {duration:?} not in expected range 200-300ms"
            );
        }
    }

    #[test]
    fn unbounded_schedule_never_exhausts() {
        let mut backoff = ExponentialBackoff::unbounded(&jitterless());
        for _ in 0..50 {
            assert!(backoff.next_backoff().is_some());
        }
        // Growth is capped at max_backoff
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn reset_restarts_schedule() {
        let mut backoff = ExponentialBackoff::new(&jitterless());
        let first = backoff.next_backoff();
        let _ = backoff.next_backoff();
        assert_eq!(backoff.waits_taken(), 2);

        backoff.reset();
        assert_eq!(backoff.waits_taken(), 0);
        assert_eq!(backoff.next_backoff(), first);
    }
}
