//! Response cache for API metadata.
//!
//! Fetch operations consult the cache before touching the network and store
//! every successfully decoded response. Entries expire after a fixed TTL.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::collection::{GameInfo, ModMetadata};

pub use memory::MemoryCache;

/// Namespace a cached value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Game,
    Mod,
}

impl CacheKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheKind::Game => "game",
            CacheKind::Mod => "mod",
        }
    }
}

/// Storage for serialized responses.
pub trait CacheBackend: Send + Sync {
    fn get(&self, kind: CacheKind, key: &str) -> Option<Bytes>;

    fn set(&self, kind: CacheKind, key: &str, value: Bytes);

    fn invalidate(&self, kind: CacheKind, key: &str);

    fn invalidate_namespace(&self, kind: CacheKind);
}

/// A response type that can be cached.
pub trait Cacheable: Serialize + DeserializeOwned + Send + 'static {
    const KIND: CacheKind;

    fn cache_key(&self) -> String;
}

impl Cacheable for ModMetadata {
    const KIND: CacheKind = CacheKind::Mod;

    fn cache_key(&self) -> String {
        self.id.to_string()
    }
}

impl Cacheable for GameInfo {
    const KIND: CacheKind = CacheKind::Game;

    fn cache_key(&self) -> String {
        self.id.to_string()
    }
}

/// Typed view over a [`CacheBackend`].
#[derive(Clone)]
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Look up a cached value. Entries that no longer decode are dropped.
    pub fn get<T: Cacheable>(&self, key: &str) -> Option<T> {
        let bytes = self.backend.get(T::KIND, key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!("Cache hit for {} {}", T::KIND.as_str(), key);
                Some(value)
            }
            Err(e) => {
                warn!("Dropping undecodable cache entry {} {}: {}", T::KIND.as_str(), key, e);
                self.backend.invalidate(T::KIND, key);
                None
            }
        }
    }

    pub fn put<T: Cacheable>(&self, value: &T) {
        let key = value.cache_key();
        match serde_json::to_vec(value) {
            Ok(bytes) => self.backend.set(T::KIND, &key, Bytes::from(bytes)),
            Err(e) => warn!("Not caching {} {}: {}", T::KIND.as_str(), key, e),
        }
    }

    pub fn invalidate<T: Cacheable>(&self, key: &str) {
        self.backend.invalidate(T::KIND, key);
    }

    /// Drop every cached value of type `T`.
    pub fn invalidate_all<T: Cacheable>(&self) {
        self.backend.invalidate_namespace(T::KIND);
    }
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::ModId;
    use std::time::Duration;

    fn cache() -> (Arc<MemoryCache>, ResponseCache) {
        let backend = Arc::new(MemoryCache::new(Duration::from_secs(60), 16));
        (backend.clone(), ResponseCache::new(backend))
    }

    #[test]
    fn test_put_then_get() {
        let (_, cache) = cache();
        let metadata = ModMetadata {
            id: ModId(9),
            name: "Better Trees".to_string(),
            ..Default::default()
        };
        cache.put(&metadata);

        assert_eq!(cache.get::<ModMetadata>("9"), Some(metadata));
        assert_eq!(cache.get::<GameInfo>("9"), None);
    }

    #[test]
    fn test_undecodable_entry_is_dropped() {
        let (backend, cache) = cache();
        backend.set(CacheKind::Mod, "3", Bytes::from_static(b"[1, 2]"));

        assert_eq!(cache.get::<ModMetadata>("3"), None);
        assert!(backend.get(CacheKind::Mod, "3").is_none());
    }

    #[test]
    fn test_invalidate() {
        let (_, cache) = cache();
        cache.put(&GameInfo {
            id: 4,
            ..Default::default()
        });
        cache.invalidate::<GameInfo>("4");
        assert!(cache.get::<GameInfo>("4").is_none());
    }

    #[test]
    fn test_invalidate_all_keeps_other_kinds() {
        let (_, cache) = cache();
        for id in [1, 2] {
            cache.put(&ModMetadata {
                id: ModId(id),
                ..Default::default()
            });
        }
        cache.put(&GameInfo {
            id: 1,
            ..Default::default()
        });

        cache.invalidate_all::<ModMetadata>();
        assert!(cache.get::<ModMetadata>("1").is_none());
        assert!(cache.get::<ModMetadata>("2").is_none());
        assert!(cache.get::<GameInfo>("1").is_some());
    }
}
