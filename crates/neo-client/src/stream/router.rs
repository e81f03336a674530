//! Subscription Router
//!
//! Tracks which instruments the caller wants ticks for and answers the
//! hot-path question "is this tick relevant?" without holding a lock.
//!
//! Subscriptions are keyed by `(exchange_segment, instrument_token)`.
//! Every mutation rebuilds an [`Arc`]'d set of composite
//! `"segment|token"` strings; the dispatch loop grabs one clone of that
//! snapshot per inbound frame and probes it lock-free. Snapshots taken
//! before a mutation keep answering for the old subscription set until
//! dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::api::types::ExchangeSegment;

// =============================================================================
// Composite Key
// =============================================================================

/// Build the `"segment|token"` composite the stream and the quote API
/// both key instruments by.
///
/// ```
/// use neo_client::api::types::ExchangeSegment;
/// use neo_client::stream::composite_key;
///
/// assert_eq!(composite_key(ExchangeSegment::NseCm, "11536"), "nse_cm|11536");
/// ```
#[must_use]
pub fn composite_key(segment: ExchangeSegment, token: &str) -> String {
    format!("{}|{token}", segment.as_str())
}

// =============================================================================
// Subscription Key
// =============================================================================

/// One instrument subscription with its feed flags.
///
/// Identity is `(exchange_segment, instrument_token)` only. Re-subscribing
/// the same instrument with different flags replaces the flags;
/// unsubscribing removes the instrument no matter which flags it was
/// subscribed with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    /// Segment the instrument trades on.
    pub exchange_segment: ExchangeSegment,
    /// Exchange-assigned instrument token, e.g. `"11536"`.
    pub instrument_token: String,
    /// Request index feed frames for this instrument.
    pub index: bool,
    /// Request full market depth frames for this instrument.
    pub depth: bool,
}

impl SubscriptionKey {
    /// Subscription with both feed flags off.
    pub fn new(exchange_segment: ExchangeSegment, instrument_token: impl Into<String>) -> Self {
        Self {
            exchange_segment,
            instrument_token: instrument_token.into(),
            index: false,
            depth: false,
        }
    }

    /// Turn the index feed flag on.
    #[must_use]
    pub const fn with_index(mut self) -> Self {
        self.index = true;
        self
    }

    /// Turn the depth feed flag on.
    #[must_use]
    pub const fn with_depth(mut self) -> Self {
        self.depth = true;
        self
    }

    /// The `"segment|token"` composite for this subscription.
    #[must_use]
    pub fn composite(&self) -> String {
        composite_key(self.exchange_segment, &self.instrument_token)
    }
}

// =============================================================================
// Router
// =============================================================================

struct RouterInner {
    /// Source of truth, keyed by instrument identity.
    subscriptions: HashMap<(ExchangeSegment, String), SubscriptionKey>,
    /// Composite-key snapshot rebuilt on every mutation.
    index: Arc<HashSet<String>>,
}

impl RouterInner {
    fn rebuild_index(&mut self) {
        let index: HashSet<String> = self
            .subscriptions
            .values()
            .map(SubscriptionKey::composite)
            .collect();
        self.index = Arc::new(index);
    }
}

/// Thread-safe subscription registry with a lock-free relevance probe.
///
/// Shared between the caller (who subscribes) and the stream dispatch
/// loop (who filters ticks), so it lives behind an [`Arc`] in practice.
pub struct SubscriptionRouter {
    inner: RwLock<RouterInner>,
}

impl SubscriptionRouter {
    /// Empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RouterInner {
                subscriptions: HashMap::new(),
                index: Arc::new(HashSet::new()),
            }),
        }
    }

    /// Add or replace subscriptions, returning the updated count.
    ///
    /// Subscribing an instrument that is already tracked replaces its
    /// feed flags. Duplicate instruments within `keys` collapse to the
    /// last occurrence.
    pub fn subscribe(&self, keys: &[SubscriptionKey]) -> usize {
        let mut inner = self.inner.write();
        for key in keys {
            inner.subscriptions.insert(
                (key.exchange_segment, key.instrument_token.clone()),
                key.clone(),
            );
        }
        inner.rebuild_index();
        inner.subscriptions.len()
    }

    /// Remove subscriptions by instrument identity, returning the
    /// updated count.
    ///
    /// Feed flags on `keys` are ignored; unsubscribing `nse_cm|11536`
    /// removes it regardless of the flags it was subscribed with.
    /// Unknown instruments are ignored.
    pub fn unsubscribe(&self, keys: &[SubscriptionKey]) -> usize {
        let mut inner = self.inner.write();
        for key in keys {
            inner
                .subscriptions
                .remove(&(key.exchange_segment, key.instrument_token.clone()));
        }
        inner.rebuild_index();
        inner.subscriptions.len()
    }

    /// Whether a tick with this `"segment|token"` composite is
    /// currently subscribed.
    ///
    /// Takes the read lock only long enough to clone the snapshot
    /// [`Arc`]; the set probe itself runs lock-free. For batch
    /// filtering prefer [`index_snapshot`](Self::index_snapshot) and
    /// probe one clone for the whole batch.
    #[must_use]
    pub fn is_relevant(&self, composite: &str) -> bool {
        let index = Arc::clone(&self.inner.read().index);
        index.contains(composite)
    }

    /// Current composite-key snapshot.
    ///
    /// The returned set is immutable; later mutations swap in a new
    /// [`Arc`] and never touch snapshots already handed out.
    #[must_use]
    pub fn index_snapshot(&self) -> Arc<HashSet<String>> {
        Arc::clone(&self.inner.read().index)
    }

    /// Every tracked subscription with its current feed flags.
    ///
    /// This is what reconnect replays to the gateway.
    #[must_use]
    pub fn subscribed_keys(&self) -> Vec<SubscriptionKey> {
        self.inner.read().subscriptions.values().cloned().collect()
    }

    /// Number of tracked instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().subscriptions.len()
    }

    /// Whether nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().subscriptions.is_empty()
    }
}

impl Default for SubscriptionRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SubscriptionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRouter")
            .field("subscriptions", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(token: &str) -> SubscriptionKey {
        SubscriptionKey::new(ExchangeSegment::NseCm, token)
    }

    #[test]
    fn subscribe_returns_updated_count() {
        let router = SubscriptionRouter::new();
        assert_eq!(router.subscribe(&[key("11536")]), 1);
        assert_eq!(router.subscribe(&[key("1594"), key("3456")]), 3);
        assert_eq!(router.len(), 3);
    }

    #[test]
    fn subscribe_is_idempotent_on_identity() {
        let router = SubscriptionRouter::new();
        assert_eq!(router.subscribe(&[key("11536")]), 1);
        assert_eq!(router.subscribe(&[key("11536")]), 1);
        assert_eq!(router.subscribe(&[key("11536").with_depth()]), 1);
    }

    #[test]
    fn resubscribe_replaces_feed_flags() {
        let router = SubscriptionRouter::new();
        router.subscribe(&[key("11536")]);
        router.subscribe(&[key("11536").with_index().with_depth()]);

        let keys = router.subscribed_keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].index);
        assert!(keys[0].depth);
    }

    #[test]
    fn unsubscribe_ignores_feed_flags() {
        let router = SubscriptionRouter::new();
        router.subscribe(&[key("11536").with_depth()]);

        // Plain key, no flags: still removes the instrument.
        assert_eq!(router.unsubscribe(&[key("11536")]), 0);
        assert!(router.is_empty());
    }

    #[test]
    fn unsubscribe_unknown_is_a_no_op() {
        let router = SubscriptionRouter::new();
        router.subscribe(&[key("11536")]);
        assert_eq!(router.unsubscribe(&[key("9999")]), 1);
        assert!(router.is_relevant("nse_cm|11536"));
    }

    #[test]
    fn relevance_uses_composite_keys() {
        let router = SubscriptionRouter::new();
        router.subscribe(&[
            key("11536"),
            SubscriptionKey::new(ExchangeSegment::NseFo, "53216"),
        ]);

        assert!(router.is_relevant("nse_cm|11536"));
        assert!(router.is_relevant("nse_fo|53216"));
        // Same token, different segment: distinct instrument.
        assert!(!router.is_relevant("bse_cm|11536"));
        assert!(!router.is_relevant("nse_cm|53216"));
    }

    #[test]
    fn old_snapshot_survives_mutation() {
        let router = SubscriptionRouter::new();
        router.subscribe(&[key("11536")]);

        let before = router.index_snapshot();
        router.unsubscribe(&[key("11536")]);
        let after = router.index_snapshot();

        assert!(before.contains("nse_cm|11536"));
        assert!(!after.contains("nse_cm|11536"));
        assert!(!router.is_relevant("nse_cm|11536"));
    }

    #[test]
    fn concurrent_subscribe_and_probe() {
        let router = Arc::new(SubscriptionRouter::new());
        let mut handles = Vec::new();

        for thread in 0..4 {
            let router = Arc::clone(&router);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let token = format!("{thread}-{i}");
                    router.subscribe(&[key(&token)]);
                    assert!(router.is_relevant(&format!("nse_cm|{token}")));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(router.len(), 400);
    }

    proptest! {
        /// The router must agree with a plain set of instrument
        /// identities across any interleaving of operations.
        #[test]
        fn router_matches_set_model(
            ops in proptest::collection::vec(
                (any::<bool>(), 0_u32..20, any::<bool>(), any::<bool>()),
                0..64,
            )
        ) {
            let router = SubscriptionRouter::new();
            let mut model: std::collections::HashSet<String> =
                std::collections::HashSet::new();

            for (subscribe, token, index, depth) in ops {
                let token = token.to_string();
                let mut k = key(&token);
                k.index = index;
                k.depth = depth;

                let count = if subscribe {
                    model.insert(token.clone());
                    router.subscribe(&[k])
                } else {
                    model.remove(&token);
                    router.unsubscribe(&[k])
                };

                prop_assert_eq!(count, model.len());
                prop_assert_eq!(
                    router.is_relevant(&format!("nse_cm|{}", token)),
                    model.contains(&token)
                );
            }

            let snapshot = router.index_snapshot();
            prop_assert_eq!(snapshot.len(), model.len());
            for token in &model {
                let composite = format!("nse_cm|{token}");
                prop_assert!(snapshot.contains(&composite));
            }
        }
    }
}
