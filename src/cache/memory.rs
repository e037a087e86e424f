//! In-memory cache backend.

use std::time::Duration;

use bytes::Bytes;
use mini_moka::sync::Cache;

use crate::cache::{CacheBackend, CacheKind};

/// TTL-bounded cache kept in process memory.
pub struct MemoryCache {
    entries: Cache<(CacheKind, String), Bytes>,
}

impl MemoryCache {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        Self {
            entries: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_entries)
                .build(),
        }
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, kind: CacheKind, key: &str) -> Option<Bytes> {
        self.entries.get(&(kind, key.to_string()))
    }

    fn set(&self, kind: CacheKind, key: &str, value: Bytes) {
        self.entries.insert((kind, key.to_string()), value);
    }

    fn invalidate(&self, kind: CacheKind, key: &str) {
        self.entries.invalidate(&(kind, key.to_string()));
    }

    fn invalidate_namespace(&self, kind: CacheKind) {
        let stale: Vec<_> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| entry.key().clone())
            .collect();
        for key in stale {
            self.entries.invalidate(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_are_separate() {
        let cache = MemoryCache::new(Duration::from_secs(60), 16);
        cache.set(CacheKind::Mod, "1", Bytes::from_static(b"mod"));
        cache.set(CacheKind::Game, "1", Bytes::from_static(b"game"));

        assert_eq!(cache.get(CacheKind::Mod, "1").as_deref(), Some(&b"mod"[..]));

        cache.invalidate_namespace(CacheKind::Mod);
        assert!(cache.get(CacheKind::Mod, "1").is_none());
        assert!(cache.get(CacheKind::Game, "1").is_some());
    }

    #[test]
    fn test_entries_expire() {
        let cache = MemoryCache::new(Duration::from_millis(20), 16);
        cache.set(CacheKind::Game, "7", Bytes::from_static(b"{}"));
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get(CacheKind::Game, "7").is_none());
    }
}
