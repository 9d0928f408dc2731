//! Resident block store.
//!
//! One decoded tile image usually carries every band of the dataset at once,
//! so the engine writes sibling bands' blocks here while satisfying a read
//! for a single band. The store doubles as the residency oracle for the
//! piggy-back fetch decision: a tile is re-fetched only if some band's block
//! at that position is missing.

use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;

/// Default number of resident blocks. At the default 1024x1024 byte blocks
/// this bounds the store at 256MB.
const DEFAULT_BLOCK_CAPACITY: usize = 256;

/// Position of one block: band, overview level (`None` = base resolution)
/// and block grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub band: usize,
    pub overview: Option<usize>,
    pub x: i64,
    pub y: i64,
}

/// LRU store of decoded raster blocks, one entry per (band, overview, x, y).
pub struct BlockStore {
    blocks: RwLock<LruCache<BlockKey, Bytes>>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BLOCK_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            blocks: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
        }
    }

    /// Whether a block is resident, without touching LRU order.
    pub async fn contains(&self, key: &BlockKey) -> bool {
        self.blocks.read().await.contains(key)
    }

    /// The block's pixel data, marking it recently used.
    pub async fn get(&self, key: &BlockKey) -> Option<Bytes> {
        self.blocks.write().await.get(key).cloned()
    }

    /// Make a block resident, replacing any previous content.
    pub async fn put(&self, key: BlockKey, data: Bytes) {
        self.blocks.write().await.put(key, data);
    }

    /// Number of resident blocks.
    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blocks.read().await.is_empty()
    }
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}
