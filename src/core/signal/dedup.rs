//! Signal deduplication.
//!
//! The key joins every identity-bearing field of a signal; the window is
//! per-type. The cache is per-process and pruned periodically so it stays
//! bounded by the emission rate times the largest window.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use crate::core::domain::{Signal, SignalType};

/// Build the dedup key `{source|type|event_id|market_id|token_id|direction}`.
#[must_use]
pub fn dedup_key(signal: &Signal) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}",
        signal.source,
        signal.signal_type.as_str(),
        signal.event_id.as_ref().map_or("", |id| id.as_str()),
        signal.market_id.as_ref().map_or("", |id| id.as_str()),
        signal.token_id.as_ref().map_or("", |id| id.as_str()),
        signal.direction.as_str(),
    )
}

/// Sliding-window duplicate filter keyed by [`dedup_key`].
#[derive(Default)]
pub struct DedupCache {
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl DedupCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `signal` is a duplicate within its type's window.
    ///
    /// First sightings are recorded; duplicates keep the earlier
    /// timestamp so the window anchors on the first emission.
    pub fn is_duplicate(&self, signal: &Signal, now: DateTime<Utc>) -> bool {
        let key = dedup_key(signal);
        let window = ChronoDuration::from_std(signal.signal_type.dedup_window())
            .unwrap_or_else(|_| ChronoDuration::seconds(60));

        let mut seen = self.seen.lock();
        match seen.get(&key) {
            Some(first_seen) if now - *first_seen < window => true,
            _ => {
                seen.insert(key, signal.created_at.unwrap_or(now));
                false
            }
        }
    }

    /// Drop entries older than the largest window; returns the count removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let horizon = ChronoDuration::from_std(SignalType::max_dedup_window())
            .unwrap_or_else(|_| ChronoDuration::seconds(120));
        let mut seen = self.seen.lock();
        let before = seen.len();
        seen.retain(|_, first_seen| now - *first_seen < horizon);
        before - seen.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Direction, MarketId, TokenId};

    fn signal(token: &str, direction: Direction, at: DateTime<Utc>) -> Signal {
        Signal::builder(SignalType::LiquidityGap, "internal_scan")
            .market(MarketId::from("m1"))
            .token(TokenId::from(token))
            .direction(direction)
            .created_at(at)
            .build()
    }

    #[test]
    fn duplicate_within_window_is_dropped() {
        let cache = DedupCache::new();
        let now = Utc::now();
        assert!(!cache.is_duplicate(&signal("t1", Direction::Yes, now), now));
        assert!(cache.is_duplicate(
            &signal("t1", Direction::Yes, now),
            now + ChronoDuration::seconds(10)
        ));
    }

    #[test]
    fn different_key_fields_are_not_duplicates() {
        let cache = DedupCache::new();
        let now = Utc::now();
        assert!(!cache.is_duplicate(&signal("t1", Direction::Yes, now), now));
        assert!(!cache.is_duplicate(&signal("t2", Direction::Yes, now), now));
        assert!(!cache.is_duplicate(&signal("t1", Direction::No, now), now));
    }

    #[test]
    fn reemission_allowed_after_window() {
        let cache = DedupCache::new();
        let now = Utc::now();
        // liquidity_gap window is 60s
        assert!(!cache.is_duplicate(&signal("t1", Direction::Yes, now), now));
        assert!(!cache.is_duplicate(
            &signal("t1", Direction::Yes, now),
            now + ChronoDuration::seconds(61)
        ));
    }

    #[test]
    fn prune_discards_old_entries() {
        let cache = DedupCache::new();
        let now = Utc::now();
        cache.is_duplicate(&signal("t1", Direction::Yes, now), now);
        cache.is_duplicate(&signal("t2", Direction::Yes, now), now);
        assert_eq!(cache.len(), 2);

        let pruned = cache.prune(now + ChronoDuration::minutes(5));
        assert_eq!(pruned, 2);
        assert!(cache.is_empty());
    }
}
