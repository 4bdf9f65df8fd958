//! Duplicate filter with TTL and size cap
//!
//! The same pending transaction arrives once per redundant connection. First
//! sighting wins; later ones within the TTL are dropped. The manager uses the
//! same filter keyed by (network, token) for auto-snipe attempts.

use alloy::primitives::TxHash;
use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

pub type TxDedupe = Dedupe<TxHash>;

pub struct Dedupe<K: Eq + Hash> {
    ttl: Duration,
    max_entries: usize,
    seen: DashMap<K, Instant>,
}

impl<K: Eq + Hash> Dedupe<K> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { ttl, max_entries: max_entries.max(1), seen: DashMap::new() }
    }

    /// true the first time `key` is seen within the TTL
    pub fn check_and_insert(&self, key: K) -> bool {
        self.check_and_insert_at(key, Instant::now())
    }

    /// Seen within the TTL, without recording anything
    pub fn contains(&self, key: &K) -> bool {
        self.contains_at(key, Instant::now())
    }

    pub fn contains_at(&self, key: &K, now: Instant) -> bool {
        self.seen
            .get(key)
            .is_some_and(|seen_at| now.saturating_duration_since(*seen_at) <= self.ttl)
    }

    pub fn check_and_insert_at(&self, key: K, now: Instant) -> bool {
        let fresh = match self.seen.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut e) => {
                if now.saturating_duration_since(*e.get()) <= self.ttl {
                    false
                } else {
                    e.insert(now);
                    true
                }
            }
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(now);
                true
            }
        };

        if fresh && self.seen.len() > self.max_entries {
            self.prune(now);
        }
        fresh
    }

    fn prune(&self, now: Instant) {
        let ttl = self.ttl;
        self.seen.retain(|_, seen_at| now.saturating_duration_since(*seen_at) <= ttl);
        // still over capacity: everything left is young, start over
        if self.seen.len() > self.max_entries {
            self.seen.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_within_ttl() {
        let dedupe = TxDedupe::new(Duration::from_secs(60), 100);
        let now = Instant::now();
        let hash = TxHash::repeat_byte(1);
        assert!(dedupe.check_and_insert_at(hash, now));
        assert!(!dedupe.check_and_insert_at(hash, now + Duration::from_secs(1)));
    }

    #[test]
    fn test_expires_after_ttl() {
        let dedupe = TxDedupe::new(Duration::from_millis(100), 100);
        let now = Instant::now();
        let hash = TxHash::repeat_byte(2);
        assert!(dedupe.check_and_insert_at(hash, now));
        assert!(dedupe.check_and_insert_at(hash, now + Duration::from_millis(200)));
    }

    #[test]
    fn test_bounded() {
        let dedupe = TxDedupe::new(Duration::from_secs(60), 4);
        let now = Instant::now();
        for i in 0..10u8 {
            dedupe.check_and_insert_at(TxHash::repeat_byte(i), now);
        }
        assert!(dedupe.len() <= 4);
    }

    #[test]
    fn test_contains_respects_ttl_without_inserting() {
        let dedupe: Dedupe<(u8, u8)> = Dedupe::new(Duration::from_millis(100), 100);
        let now = Instant::now();
        assert!(!dedupe.contains_at(&(1, 2), now));
        assert!(dedupe.is_empty());

        assert!(dedupe.check_and_insert_at((1, 2), now));
        assert!(dedupe.contains_at(&(1, 2), now + Duration::from_millis(50)));
        assert!(!dedupe.contains_at(&(1, 2), now + Duration::from_millis(200)));
    }
}
