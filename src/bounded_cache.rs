//! Size- and age-bounded map used by the resolvers and the candidate cache.
//!
//! Every value carries the timestamp (epoch milliseconds) of its last write.
//! There is no background timer: callers run [`BoundedCache::evict`] at the
//! start of each operation, and [`BoundedCache::insert`] never lets the map
//! grow past `max_entries`. Both passes are O(n), which is fine for the
//! small bounds used here (at most a few hundred entries).

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Stamped<V> {
    value: V,
    updated_at: i64,
}

/// What an eviction pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionStats {
    /// Entries older than the TTL
    pub expired: usize,
    /// Oldest entries dropped to get back under the size bound
    pub overflow: usize,
}

impl EvictionStats {
    pub fn total(&self) -> usize {
        self.expired + self.overflow
    }
}

#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    entries: HashMap<K, Stamped<V>>,
    ttl_ms: i64,
    max_entries: usize,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// `max_entries` of zero is treated as one so an insert is always kept.
    pub fn new(ttl_ms: i64, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_ms,
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|s| &s.value)
    }

    /// Insert or overwrite `key`, stamping it with `now`.
    ///
    /// When a new key would push the map past its bound, the oldest existing
    /// entries are dropped first. The entry being written is never evicted.
    pub fn insert(&mut self, key: K, value: V, now: i64) -> usize {
        let mut dropped = 0;
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.max_entries {
                match self.oldest_key() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                        dropped += 1;
                    }
                    None => break,
                }
            }
        }
        self.entries.insert(
            key,
            Stamped {
                value,
                updated_at: now,
            },
        );
        dropped
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|s| s.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop entries older than the TTL, then the oldest entries until the map
    /// fits its bound.
    pub fn evict(&mut self, now: i64) -> EvictionStats {
        let before = self.entries.len();
        let ttl = self.ttl_ms;
        self.entries.retain(|_, s| now - s.updated_at <= ttl);
        let expired = before - self.entries.len();

        let mut overflow = 0;
        if self.entries.len() > self.max_entries {
            let mut by_age: Vec<(K, i64)> = self
                .entries
                .iter()
                .map(|(k, s)| (k.clone(), s.updated_at))
                .collect();
            by_age.sort_by_key(|(_, updated_at)| *updated_at);

            let excess = self.entries.len() - self.max_entries;
            for (key, _) in by_age.into_iter().take(excess) {
                self.entries.remove(&key);
                overflow += 1;
            }
        }

        EvictionStats { expired, overflow }
    }

    fn oldest_key(&self) -> Option<K> {
        self.entries
            .iter()
            .min_by_key(|(_, s)| s.updated_at)
            .map(|(k, _)| k.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_expired_entries_are_dropped() {
        let mut cache: BoundedCache<&str, u32> = BoundedCache::new(1_000, 8);
        cache.insert("a", 1, 0);
        cache.insert("b", 2, 600);

        let stats = cache.evict(1_500);

        assert_eq!(stats.expired, 1);
        assert!(!cache.contains_key(&"a"));
        assert_eq!(cache.get(&"b"), Some(&2));
    }

    #[test]
    fn test_entry_exactly_at_ttl_survives() {
        let mut cache: BoundedCache<&str, u32> = BoundedCache::new(1_000, 8);
        cache.insert("a", 1, 0);

        assert_eq!(cache.evict(1_000).total(), 0);
        assert_eq!(cache.evict(1_001).expired, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_returns_value() {
        let mut cache: BoundedCache<&str, u32> = BoundedCache::new(1_000, 4);
        cache.insert("a", 1, 0);

        assert_eq!(cache.remove(&"a"), Some(1));
        assert_eq!(cache.remove(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_drops_oldest_when_full() {
        let mut cache: BoundedCache<String, u32> = BoundedCache::new(60_000, 3);
        for i in 0..3 {
            cache.insert(format!("k{i}"), i, i as i64 * 10);
        }

        let dropped = cache.insert("k3".to_string(), 3, 100);

        assert_eq!(dropped, 1);
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains_key(&"k0".to_string()));
        assert!(cache.contains_key(&"k3".to_string()));
    }

    #[test]
    fn test_overwrite_refreshes_timestamp_without_eviction() {
        let mut cache: BoundedCache<&str, u32> = BoundedCache::new(60_000, 2);
        cache.insert("a", 1, 0);
        cache.insert("b", 2, 10);

        assert_eq!(cache.insert("a", 11, 20), 0);
        assert_eq!(cache.get(&"a"), Some(&11));

        // "a" was rewritten at 20, so "b" is now the oldest.
        cache.insert("c", 3, 30);
        assert!(!cache.contains_key(&"b"));
        assert!(cache.contains_key(&"a"));
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_bound_and_keeps_newest(
            max in 1usize..16,
            keys in proptest::collection::vec(0u16..64, 1..200),
        ) {
            let mut cache: BoundedCache<u16, usize> = BoundedCache::new(i64::MAX / 2, max);
            for (tick, key) in keys.iter().enumerate() {
                cache.insert(*key, tick, tick as i64);
                prop_assert!(cache.len() <= max);
            }

            // The most recently written distinct keys are the ones retained.
            let mut newest: Vec<u16> = Vec::new();
            for key in keys.iter().rev() {
                if !newest.contains(key) {
                    newest.push(*key);
                }
                if newest.len() == max {
                    break;
                }
            }
            for key in newest {
                prop_assert!(cache.contains_key(&key));
            }
        }
    }
}
