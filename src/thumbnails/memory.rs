//! Byte-bounded LRU cache of decoded thumbnails.

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use super::buffer::ThumbnailBuffer;
use super::config::CacheBudget;
use super::key::ThumbnailKey;

/// Recency order and byte accounting, always updated together.
struct MemoryState {
    entries: LruCache<ThumbnailKey, ThumbnailBuffer>,
    current_bytes: usize,
}

impl MemoryState {
    fn remove(&mut self, key: &ThumbnailKey) -> Option<ThumbnailBuffer> {
        let removed = self.entries.pop(key)?;
        self.current_bytes = self.current_bytes.saturating_sub(removed.byte_size());
        Some(removed)
    }
}

/// In-process thumbnail cache with least-recently-used eviction.
///
/// Both reads and writes refresh an entry's recency. A single mutex guards
/// the LRU list and the byte count so concurrent callers never observe them
/// out of step.
pub struct MemoryCache {
    state: Mutex<MemoryState>,
    max_bytes: usize,
}

impl MemoryCache {
    pub fn new(budget: CacheBudget) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                entries: LruCache::unbounded(),
                current_bytes: 0,
            }),
            max_bytes: budget.bytes(),
        }
    }

    /// Look up a thumbnail, marking it most recently used.
    pub fn get(&self, key: &ThumbnailKey) -> Option<ThumbnailBuffer> {
        self.state.lock().entries.get(key).cloned()
    }

    /// Insert a thumbnail, evicting least recently used entries until it fits.
    ///
    /// Returns `false` when the buffer alone exceeds the budget; it is not
    /// cached and any previous entry for `key` is dropped.
    pub fn put(&self, key: ThumbnailKey, buffer: ThumbnailBuffer) -> bool {
        let size = buffer.byte_size();
        let mut state = self.state.lock();

        state.remove(&key);

        if size > self.max_bytes {
            trace!(%key, size, max_bytes = self.max_bytes, "Thumbnail larger than memory budget");
            return false;
        }

        while state.current_bytes + size > self.max_bytes {
            match state.entries.pop_lru() {
                Some((evicted_key, evicted)) => {
                    state.current_bytes = state.current_bytes.saturating_sub(evicted.byte_size());
                    trace!(
                        key = %evicted_key,
                        evicted_bytes = evicted.byte_size(),
                        current_bytes = state.current_bytes,
                        "Evicted thumbnail from memory cache"
                    );
                }
                None => break,
            }
        }

        state.entries.put(key, buffer);
        state.current_bytes += size;
        true
    }

    /// Check for an entry without touching its recency.
    pub fn contains(&self, key: &ThumbnailKey) -> bool {
        self.state.lock().entries.contains(key)
    }

    pub fn remove(&self, key: &ThumbnailKey) -> Option<ThumbnailBuffer> {
        self.state.lock().remove(key)
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.current_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Bytes currently charged against the budget.
    pub fn current_bytes(&self) -> usize {
        self.state.lock().current_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<ThumbnailKey> {
        self.state.lock().entries.iter().map(|(k, _)| *k).collect()
    }
}
