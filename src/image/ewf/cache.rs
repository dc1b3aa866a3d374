//! LRU Chunk Cache for the EWF handle (like libfcache)

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Decompressed chunk cache with LRU eviction
///
/// Directory walks read the same MFT and index chunks over and over, so even
/// a small cache saves most of the zlib work.
pub(crate) struct ChunkCache {
    cache: HashMap<usize, Arc<Vec<u8>>>,
    lru_queue: VecDeque<usize>,
    max_entries: usize,
}

impl ChunkCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            cache: HashMap::new(),
            lru_queue: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn get(&mut self, chunk_index: usize) -> Option<Arc<Vec<u8>>> {
        let data = self.cache.get(&chunk_index)?;
        self.lru_queue.retain(|&x| x != chunk_index);
        self.lru_queue.push_front(chunk_index);
        Some(Arc::clone(data))
    }

    pub fn insert(&mut self, chunk_index: usize, data: Arc<Vec<u8>>) {
        if self.cache.len() >= self.max_entries {
            if let Some(old_index) = self.lru_queue.pop_back() {
                self.cache.remove(&old_index);
            }
        }

        self.cache.insert(chunk_index, data);
        self.lru_queue.push_front(chunk_index);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.lru_queue.clear();
    }
}
