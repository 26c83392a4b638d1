//! Bounded in-memory key/value store with per-entry time-to-live.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    /// `None` never expires.
    ttl: Option<Duration>,
    /// Insertion order, used to evict among entries that never expire.
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn expires_at(&self) -> Option<Instant> {
        self.ttl.map(|ttl| self.inserted_at + ttl)
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at().is_some_and(|at| now > at)
    }
}

/// Expired entries read as absent but stay in place until overwritten,
/// removed, purged, or evicted.
pub struct CacheStore<V> {
    entries: HashMap<String, CacheEntry<V>>,
    capacity: usize,
    next_seq: u64,
}

impl<V: Clone> CacheStore<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries.get(key).is_some_and(|e| !e.is_expired(now))
    }

    /// Stores `value`, replacing any entry under `key`. A new key arriving at
    /// capacity evicts exactly one entry first: the one expiring soonest, or
    /// the oldest insertion when nothing left has a TTL.
    pub fn put(&mut self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_one();
        }

        self.next_seq += 1;
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
                seq: self.next_seq,
            },
        );
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Keeps only the entries whose key satisfies `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|key, _| keep(key));
    }

    /// Drops every expired entry, returning how many went.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_one(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.expires_at().is_none(), e.expires_at(), e.seq))
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::advance;

    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_get_within_ttl() {
        let mut cache = CacheStore::new(4);
        cache.put("a", 1, Some(MINUTE));
        advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("a"), Some(1));
        assert!(cache.contains("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_absent() {
        let mut cache = CacheStore::new(4);
        cache.put("a", 1, Some(MINUTE));
        advance(MINUTE + Duration::from_millis(1)).await;
        assert_eq!(cache.get("a"), None);
        assert!(!cache.contains("a"));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_expiring_entry() {
        let mut cache = CacheStore::new(4);
        cache.put("a", 1, None);
        advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert_eq!(cache.get("a"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_restarts_ttl() {
        let mut cache = CacheStore::new(1);
        cache.put("a", 1, Some(MINUTE));
        advance(Duration::from_secs(45)).await;
        cache.put("a", 2, Some(MINUTE));
        advance(Duration::from_secs(45)).await;
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cache_evicts_soonest_expiry() {
        let mut cache = CacheStore::new(3);
        cache.put("long", 1, Some(10 * MINUTE));
        cache.put("short", 2, Some(MINUTE));
        cache.put("forever", 3, None);

        cache.put("new", 4, Some(5 * MINUTE));

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get("long"), Some(1));
        assert_eq!(cache.get("forever"), Some(3));
        assert_eq!(cache.get("new"), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_ttls_evicts_oldest_insertion() {
        let mut cache = CacheStore::new(2);
        cache.put("first", 1, None);
        cache.put("second", 2, None);
        cache.put("third", 3, None);

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("first"));
        assert!(cache.contains("second"));
        assert!(cache.contains("third"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_and_retain() {
        let mut cache = CacheStore::new(8);
        cache.put("chart@v1", 1, None);
        cache.put("chart@v2", 2, None);
        cache.put("other@v1", 3, None);

        assert_eq!(cache.remove("other@v1"), Some(3));
        assert_eq!(cache.remove("other@v1"), None);

        cache.retain(|key| !key.starts_with("chart@"));
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_fabricates_values() {
        let cache: CacheStore<u32> = CacheStore::new(2);
        assert_eq!(cache.get("missing"), None);
        assert!(!cache.contains("missing"));
    }
}
