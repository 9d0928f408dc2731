//! Persistent tile cache contract and an in-memory implementation.
//!
//! Tiles are shared content addressed purely by URL, so one cache may back
//! any number of datasets concurrently; implementations must be safe under
//! concurrent readers and writers. Eviction policy and storage format belong
//! to the implementation.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;
use url::Url;

/// Default capacity of the in-memory cache: 100MB.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 100 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead).
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Presence of a tile in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheItemStatus {
    Ok,
    Missing,
}

/// Key (URL) to tile bytes store.
#[async_trait]
pub trait TileCache: Send + Sync {
    /// Whether the cache holds an entry for this URL.
    async fn item_status(&self, url: &Url) -> CacheItemStatus;

    /// The cached bytes for this URL, if present.
    async fn get(&self, url: &Url) -> Option<Bytes>;

    /// Store the bytes for this URL, replacing any previous entry.
    async fn insert(&self, url: &Url, data: Bytes);
}

/// LRU tile cache with size-based capacity, shareable across datasets via
/// `Arc`.
pub struct MemoryTileCache {
    cache: RwLock<LruCache<Arc<str>, Bytes>>,
    max_size: usize,
    current_size: RwLock<usize>,
}

impl MemoryTileCache {
    /// Create a cache with the default capacity (100MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a cache with the given capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_MAX_ENTRIES).unwrap(),
            )),
            max_size,
            current_size: RwLock::new(0),
        }
    }

    /// Current total size of cached tiles in bytes.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    /// Number of cached tiles.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Remove all entries.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;
        cache.clear();
        *current_size = 0;
    }
}

impl Default for MemoryTileCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TileCache for MemoryTileCache {
    async fn item_status(&self, url: &Url) -> CacheItemStatus {
        if self.cache.read().await.contains(url.as_str()) {
            CacheItemStatus::Ok
        } else {
            CacheItemStatus::Missing
        }
    }

    async fn get(&self, url: &Url) -> Option<Bytes> {
        let mut cache = self.cache.write().await;
        cache.get(url.as_str()).cloned()
    }

    async fn insert(&self, url: &Url, data: Bytes) {
        let data_size = data.len();
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        let key: Arc<str> = Arc::from(url.as_str());
        if let Some(old) = cache.peek(&key) {
            *current_size = current_size.saturating_sub(old.len());
        }

        cache.put(key, data);
        *current_size += data_size;

        while *current_size > self.max_size {
            if let Some((_, evicted)) = cache.pop_lru() {
                *current_size = current_size.saturating_sub(evicted.len());
            } else {
                break;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
