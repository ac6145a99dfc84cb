//! Time-bounded cache for repository lookups

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Concurrent map whose entries expire after a fixed TTL
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, (Instant, V)>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty cache
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Cached value, if present and not expired
    pub fn get(&self, key: &K) -> Option<V> {
        {
            let entry = self.entries.get(key)?;
            if entry.0.elapsed() < self.ttl {
                return Some(entry.1.clone());
            }
        }
        // the read guard must be released before removing
        self.entries.remove(key);
        None
    }

    /// Store a value
    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, (Instant::now(), value));
    }

    /// Drop one entry
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_and_invalidate() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);

        assert_eq!(cache.get(&"a"), Some(1));
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);

        cache.clear();
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn test_entries_expire() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.insert(1, "value");
        assert_eq!(cache.get(&1), None);
        assert!(cache.entries.is_empty());
    }
}
