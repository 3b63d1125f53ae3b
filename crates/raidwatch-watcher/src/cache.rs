//! TTL-bounded key-value cache for report state.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::trace;

/// A concurrent map whose entries expire a fixed duration after the write
/// that produced them.
///
/// Reads never refresh an entry's TTL; a write overwrites the value and
/// resets the full TTL. Expired entries are dropped lazily on read and by
/// the [`run_eviction`](TtlCache::run_eviction) sweep.
pub struct TtlCache<V> {
    entries: DashMap<String, Entry<V>>,
    ttl: Duration,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Look up a live entry. Expired entries read as absent and are
    /// removed.
    pub fn get(&self, key: &str) -> Option<V> {
        {
            let entry = self.entries.get(key)?;
            if Instant::now() < entry.expires_at {
                return Some(entry.value.clone());
            }
        }
        // Guard dropped above; removing while holding it would deadlock
        // on the shard lock.
        self.entries.remove(key);
        None
    }

    /// Insert or overwrite, resetting the entry's full TTL.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop all expired entries; returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Background sweep removing expired entries on a fixed interval,
    /// until the shutdown channel fires or its sender is dropped.
    pub async fn run_eviction(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(interval) => {
                    let evicted = self.evict_expired();
                    if evicted > 0 {
                        trace!(evicted, "evicted expired cache entries");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_inserted_value() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1u32);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn insert_overwrites_existing_entry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1u32);
        cache.insert("a", 2u32);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entries_read_as_absent() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.insert("a", 1u32);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("a"), None);
        // The expired read also dropped the entry.
        assert!(cache.is_empty());
    }

    #[test]
    fn eviction_sweep_drops_only_expired_entries() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.insert("old", 1u32);
        std::thread::sleep(Duration::from_millis(20));
        cache.insert("new", 2u32);

        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.get("new"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn eviction_task_stops_on_shutdown() {
        let cache = std::sync::Arc::new(TtlCache::<u32>::new(Duration::from_secs(60)));
        let (tx, rx) = watch::channel(false);

        let sweeper = {
            let cache = std::sync::Arc::clone(&cache);
            tokio::spawn(async move {
                cache.run_eviction(Duration::from_millis(5), rx).await;
            })
        };

        tx.send(true).unwrap();
        sweeper.await.unwrap();
    }
}
