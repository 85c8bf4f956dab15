/// Lock-free block caching for repeated window reads

use std::sync::Arc;
use dashmap::DashMap;
use crossbeam::queue::SegQueue;

/// Identifies one decoded block: sample plane and block index within it
pub type BlockKey = (usize, usize);

/// Lock-free LRU cache of decoded raster blocks
///
/// Clones share the same storage, so every reader of one dataset can hit
/// blocks decoded by the others.
pub struct BlockCache {
    blocks: Arc<DashMap<BlockKey, Arc<Vec<u8>>>>,
    lru: Arc<SegQueue<BlockKey>>,
    max_blocks: usize,
}

impl BlockCache {
    /// Creates a new block cache
    ///
    /// # Arguments
    /// * `max_blocks` - Maximum number of decoded blocks kept (at least 1)
    pub fn new(max_blocks: usize) -> Self {
        Self {
            blocks: Arc::new(DashMap::new()),
            lru: Arc::new(SegQueue::new()),
            max_blocks: max_blocks.max(1),
        }
    }

    /// Gets a decoded block
    pub fn get(&self, plane: usize, block: usize) -> Option<Arc<Vec<u8>>> {
        let key = (plane, block);

        if let Some(entry) = self.blocks.get(&key) {
            self.lru.push(key);
            return Some(Arc::clone(entry.value()));
        }

        None
    }

    /// Inserts a decoded block, evicting the least recently touched ones
    pub fn put(&self, plane: usize, block: usize, data: Arc<Vec<u8>>) {
        let key = (plane, block);

        while self.blocks.len() >= self.max_blocks {
            if let Some(old_key) = self.lru.pop() {
                self.blocks.remove(&old_key);
            } else {
                break;
            }
        }

        self.blocks.insert(key, data);
        self.lru.push(key);
    }

    pub fn clear(&self) {
        self.blocks.clear();

        while self.lru.pop().is_some() {}
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns cache statistics
    pub fn stats(&self) -> CacheStats {
        let total_bytes: usize = self.blocks
            .iter()
            .map(|entry| entry.value().len())
            .sum();

        CacheStats {
            block_count: self.blocks.len(),
            total_bytes,
            max_blocks: self.max_blocks,
        }
    }
}

impl Clone for BlockCache {
    fn clone(&self) -> Self {
        Self {
            blocks: Arc::clone(&self.blocks),
            lru: Arc::clone(&self.lru),
            max_blocks: self.max_blocks,
        }
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of blocks currently cached
    pub block_count: usize,
    /// Total decoded bytes held
    pub total_bytes: usize,
    /// Maximum number of blocks
    pub max_blocks: usize,
}
