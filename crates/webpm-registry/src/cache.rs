//! Two-tier metadata cache (spec §4.4): a bounded in-memory LRU in front of
//! an optional injected persistent KV store (IndexedDB in a browser host,
//! a file or nothing elsewhere).

use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::meta::PackageMeta;

/// A host-supplied persistent tier. `None` degrades the cache to
/// memory-only, which is a valid host configuration (spec §4.4 "optional").
#[async_trait]
pub trait PersistentCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn put(&self, key: &str, value: Vec<u8>);
    async fn clear(&self);
}

struct CacheEntry {
    bytes: Vec<u8>,
    inserted_at: Instant,
}

pub struct MetadataCache {
    memory: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    persistent: Option<Arc<dyn PersistentCache>>,
}

impl MetadataCache {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration, persistent: Option<Arc<dyn PersistentCache>>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            memory: Mutex::new(LruCache::new(capacity)),
            ttl,
            persistent,
        }
    }

    pub async fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        {
            let mut memory = self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(entry) = memory.get(key) {
                if entry.inserted_at.elapsed() < self.ttl {
                    return Some(entry.bytes.clone());
                }
            }
        }

        if let Some(persistent) = &self.persistent {
            if let Some(bytes) = persistent.get(key).await {
                self.put_memory(key.to_string(), bytes.clone());
                return Some(bytes);
            }
        }

        None
    }

    /// Returns a cached value even if past its TTL, without touching the
    /// persistent tier. Used by `preferOffline` fallback when a live fetch
    /// fails (spec §6 "prefer an expired cache entry to a network round-trip
    /// when network fails").
    pub fn get_raw_stale(&self, key: &str) -> Option<Vec<u8>> {
        let mut memory = self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        memory.get(key).map(|entry| entry.bytes.clone())
    }

    pub async fn put_raw(&self, key: String, bytes: Vec<u8>) {
        self.put_memory(key.clone(), bytes.clone());
        if let Some(persistent) = &self.persistent {
            persistent.put(&key, bytes).await;
        }
    }

    fn put_memory(&self, key: String, bytes: Vec<u8>) {
        let mut memory = self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        memory.put(key, CacheEntry { bytes, inserted_at: Instant::now() });
    }

    pub async fn clear(&self) {
        self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
        if let Some(persistent) = &self.persistent {
            persistent.clear().await;
        }
    }

    pub async fn get_package_meta(&self, key: &str) -> Option<Arc<PackageMeta>> {
        let bytes = self.get_raw(key).await?;
        serde_json::from_slice(&bytes).ok().map(Arc::new)
    }

    #[must_use]
    pub fn get_package_meta_stale(&self, key: &str) -> Option<Arc<PackageMeta>> {
        let bytes = self.get_raw_stale(key)?;
        serde_json::from_slice(&bytes).ok().map(Arc::new)
    }

    pub async fn put_package_meta(&self, key: String, meta: &PackageMeta) {
        if let Ok(bytes) = serde_json::to_vec(meta) {
            self.put_raw(key, bytes).await;
        }
    }
}

#[must_use]
pub fn meta_key(name: &str, registry_base: &str) -> String {
    format!("meta:{name}@{registry_base}")
}

#[must_use]
pub fn versions_key(name: &str) -> String {
    format!("versions:{name}")
}

#[must_use]
pub fn search_key(query: &str, limit: usize, offset: usize) -> String {
    format!("search:{query}:{limit}:{offset}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_tier_round_trips() {
        let cache = MetadataCache::new(10, Duration::from_secs(60), None);
        cache.put_raw("meta:lodash@registry".to_string(), b"hello".to_vec()).await;
        let got = cache.get_raw("meta:lodash@registry").await;
        assert_eq!(got, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let cache = MetadataCache::new(10, Duration::from_millis(1), None);
        cache.put_raw("k".to_string(), b"v".to_vec()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.get_raw("k").await, None);
    }

    #[tokio::test]
    async fn clear_empties_the_memory_tier() {
        let cache = MetadataCache::new(10, Duration::from_secs(60), None);
        cache.put_raw("k".to_string(), b"v".to_vec()).await;
        cache.clear().await;
        assert_eq!(cache.get_raw("k").await, None);
    }
}
