//! Thumbnail caching with both disk and memory layers.
//!
//! - Memory cache: byte-bounded LRU of decoded RGBA buffers
//! - Disk cache: PNG files named `<photo id>.png` in a flat directory
//! - Decoder: rotates and crops the original when both tiers miss
//!
//! Every hit in a slower tier warms the faster ones before returning, and a
//! decode is persisted in the background so callers never wait on disk I/O.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, trace, warn};

use super::buffer::ThumbnailBuffer;
use super::config::{default_cache_dir, CacheBudget, CacheConfig};
use super::disk::DiskCache;
use super::generator::ThumbnailGenerator;
use super::inflight::{InFlight, Joined};
use super::key::ThumbnailKey;
use super::memory::MemoryCache;
use super::stats::{CacheStats, CacheStatsSnapshot};
use super::writer::DiskWriter;
use crate::error::ThumbnailError;
use crate::image_loader::ImageStore;
use crate::models::{Photo, SourceDescriptor};

/// Two-tier thumbnail cache in front of the decoder.
///
/// Cloning is cheap and every clone shares the same tiers, so one manager
/// can be handed to many rendering threads.
pub struct ThumbnailCacheManager {
    memory: Arc<MemoryCache>,
    disk: Arc<DiskCache>,
    writer: Arc<DiskWriter>,
    in_flight: Arc<InFlight>,
    store: Arc<dyn ImageStore>,
    stats: Arc<CacheStats>,
    thumb_size: u32,
}

impl ThumbnailCacheManager {
    pub fn new(config: CacheConfig, store: Arc<dyn ImageStore>) -> Self {
        let stats = Arc::new(CacheStats::default());
        let disk = Arc::new(DiskCache::new(config.cache_dir, config.disk_budget));
        let writer = Arc::new(DiskWriter::spawn(Arc::clone(&disk), Arc::clone(&stats)));

        debug!(
            cache_dir = ?disk.dir(),
            memory_bytes = config.memory_budget.bytes(),
            thumb_size = config.thumb_size,
            "Initialized thumbnail cache"
        );

        Self {
            memory: Arc::new(MemoryCache::new(config.memory_budget)),
            disk,
            writer,
            in_flight: Arc::new(InFlight::new()),
            store,
            stats,
            thumb_size: config.thumb_size,
        }
    }

    pub fn builder() -> ThumbnailCacheBuilder {
        ThumbnailCacheBuilder::new()
    }

    /// Get a thumbnail, consulting memory, then disk, then the decoder.
    ///
    /// Only decode failures reach the caller; disk-tier problems degrade to
    /// the next tier. Concurrent calls for the same key share one load.
    pub fn get_thumbnail(
        &self,
        key: ThumbnailKey,
        source: &SourceDescriptor,
    ) -> Result<ThumbnailBuffer, ThumbnailError> {
        if let Some(cached) = self.get_cached(key) {
            return Ok(cached);
        }

        let guard = match self.in_flight.join(key) {
            Joined::Owner(guard) => guard,
            Joined::Waited(result) => {
                trace!(%key, "Joined in-flight thumbnail load");
                self.stats.record_coalesced();
                return result;
            }
        };

        // A flight for this key may have completed between the memory probe and the join.
        if let Some(cached) = self.memory.get(&key) {
            self.stats.record_memory_hit();
            return guard.complete(Ok(cached));
        }

        guard.complete(self.load_uncached(key, source))
    }

    /// Shorthand for [`get_thumbnail`](Self::get_thumbnail) on a listed photo.
    pub fn get_photo_thumbnail(&self, photo: &Photo) -> Result<ThumbnailBuffer, ThumbnailError> {
        self.get_thumbnail(photo.key(), &photo.source())
    }

    /// Get a thumbnail from the memory tier only.
    pub fn get_cached(&self, key: ThumbnailKey) -> Option<ThumbnailBuffer> {
        let cached = self.memory.get(&key)?;
        trace!(%key, "Memory cache hit");
        self.stats.record_memory_hit();
        Some(cached)
    }

    /// Disk, then decode. Runs with the key's flight held.
    fn load_uncached(
        &self,
        key: ThumbnailKey,
        source: &SourceDescriptor,
    ) -> Result<ThumbnailBuffer, ThumbnailError> {
        if let Some(cached) = self.load_from_disk(key) {
            trace!(%key, "Disk cache hit");
            self.stats.record_disk_hit();
            self.memory.put(key, cached.clone());
            return Ok(cached);
        }

        debug!(%key, handle = %source.handle, "Cache miss, generating thumbnail");
        let size = (self.thumb_size, self.thumb_size);
        let decoded = ThumbnailGenerator::decode_thumbnail(self.store.as_ref(), source, size);
        self.stats.record_decode(decoded.is_ok());

        let thumbnail = decoded.inspect_err(|e| {
            warn!(%key, error = %e, "Failed to generate thumbnail");
        })?;

        self.memory.put(key, thumbnail.clone());
        self.writer.enqueue(key, thumbnail.clone());
        Ok(thumbnail)
    }

    /// Read the disk tier, treating unreadable or stale files as a miss.
    fn load_from_disk(&self, key: ThumbnailKey) -> Option<ThumbnailBuffer> {
        match self.disk.load(key) {
            Ok(Some(cached)) if cached.dimensions() == (self.thumb_size, self.thumb_size) => {
                Some(cached)
            }
            Ok(Some(cached)) => {
                debug!(
                    %key,
                    width = cached.width(),
                    height = cached.height(),
                    "Discarding cached thumbnail with stale dimensions"
                );
                self.discard_disk_entry(key);
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(%key, error = %e, "Failed to read cached thumbnail, regenerating");
                self.stats.record_disk_read_failure();
                self.discard_disk_entry(key);
                None
            }
        }
    }

    fn discard_disk_entry(&self, key: ThumbnailKey) {
        if let Err(e) = self.disk.remove(key) {
            warn!(%key, error = ?e, "Failed to remove cached thumbnail");
        }
    }

    /// Check if a thumbnail exists in the memory tier.
    pub fn contains_in_memory(&self, key: ThumbnailKey) -> bool {
        self.memory.contains(&key)
    }

    /// Check if a thumbnail exists in the disk tier.
    pub fn contains_on_disk(&self, key: ThumbnailKey) -> bool {
        self.disk.contains(key)
    }

    /// Drop a thumbnail from both tiers. Returns whether anything was removed.
    pub fn invalidate(&self, key: ThumbnailKey) -> bool {
        let memory_removed = self.memory.remove(&key).is_some();
        let disk_removed = match self.disk.remove(key) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(%key, error = ?e, "Failed to remove cached thumbnail");
                false
            }
        };
        memory_removed || disk_removed
    }

    /// Clear the memory cache.
    pub fn clear_memory(&self) {
        self.memory.clear();
        debug!("Cleared memory cache");
    }

    /// Clear both memory and disk caches.
    pub fn clear_all(&self) -> Result<()> {
        self.writer.flush();
        self.clear_memory();
        self.disk.clear()?;
        Ok(())
    }

    /// Wait until every queued disk save has been attempted.
    pub fn flush(&self) {
        self.writer.flush();
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Get the current memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.memory.current_bytes()
    }

    /// Get the number of entries in the memory cache.
    pub fn memory_entry_count(&self) -> usize {
        self.memory.len()
    }

    /// Get the maximum memory limit in bytes.
    pub fn max_memory(&self) -> usize {
        self.memory.max_bytes()
    }

    /// Get the cache directory path.
    pub fn cache_dir(&self) -> &Path {
        self.disk.dir()
    }

    pub fn thumb_size(&self) -> u32 {
        self.thumb_size
    }

    pub fn store(&self) -> &Arc<dyn ImageStore> {
        &self.store
    }
}

impl Clone for ThumbnailCacheManager {
    fn clone(&self) -> Self {
        Self {
            memory: Arc::clone(&self.memory),
            disk: Arc::clone(&self.disk),
            writer: Arc::clone(&self.writer),
            in_flight: Arc::clone(&self.in_flight),
            store: Arc::clone(&self.store),
            stats: Arc::clone(&self.stats),
            thumb_size: self.thumb_size,
        }
    }
}

/// Builder for ThumbnailCacheManager with configuration options.
pub struct ThumbnailCacheBuilder {
    cache_dir: Option<PathBuf>,
    memory_budget: Option<CacheBudget>,
    disk_budget_mb: Option<u64>,
    thumb_size: Option<u32>,
}

impl ThumbnailCacheBuilder {
    pub fn new() -> Self {
        Self {
            cache_dir: None,
            memory_budget: None,
            disk_budget_mb: None,
            thumb_size: None,
        }
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn memory_budget(mut self, budget: CacheBudget) -> Self {
        self.memory_budget = Some(budget);
        self
    }

    pub fn max_memory_mb(self, mb: usize) -> Self {
        self.memory_budget(CacheBudget::from_megabytes(mb))
    }

    pub fn disk_budget_mb(mut self, mb: u64) -> Self {
        self.disk_budget_mb = Some(mb);
        self
    }

    pub fn thumb_size(mut self, size: u32) -> Self {
        self.thumb_size = Some(size.max(1));
        self
    }

    /// Resolve defaults into a config without creating anything.
    pub fn config(self) -> Result<CacheConfig> {
        let cache_dir = match self.cache_dir {
            Some(dir) => dir,
            None => default_cache_dir()?,
        };
        let mut config = CacheConfig::new(cache_dir);
        config.memory_budget = self
            .memory_budget
            .unwrap_or_else(CacheBudget::from_available_memory);
        config.disk_budget = self.disk_budget_mb.map(|mb| mb * 1024 * 1024);
        if let Some(size) = self.thumb_size {
            config.thumb_size = size;
        }
        Ok(config)
    }

    pub fn build(self, store: Arc<dyn ImageStore>) -> Result<ThumbnailCacheManager> {
        Ok(ThumbnailCacheManager::new(self.config()?, store))
    }
}

impl Default for ThumbnailCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Orientation;
    use crate::testing::{encode, encode_png, split_image, CountingStore};
    use image::ImageFormat;
    use std::fs;
    use std::thread;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const THUMB: u32 = 16;

    fn key(id: u64) -> ThumbnailKey {
        ThumbnailKey::from_photo_id(id)
    }

    fn source(handle: &str) -> SourceDescriptor {
        SourceDescriptor::new(handle, Orientation::UPRIGHT)
    }

    fn manager_with(store: Arc<CountingStore>, thumb_size: u32) -> (ThumbnailCacheManager, TempDir) {
        let dir = tempdir().unwrap();
        let manager = ThumbnailCacheManager::builder()
            .cache_dir(dir.path())
            .memory_budget(CacheBudget::from_bytes(1024 * 1024 * 4))
            .thumb_size(thumb_size)
            .build(store)
            .unwrap();
        (manager, dir)
    }

    fn manager(store: Arc<CountingStore>) -> (ThumbnailCacheManager, TempDir) {
        manager_with(store, THUMB)
    }

    #[test]
    fn test_miss_then_populate_both_tiers() {
        let store = Arc::new(CountingStore::new());
        store.insert_png("a", &split_image(64, 48));
        let (cache, _dir) = manager(Arc::clone(&store));

        let thumb = cache.get_thumbnail(key(1), &source("a")).unwrap();
        cache.flush();

        assert_eq!(thumb.dimensions(), (THUMB, THUMB));
        assert!(cache.contains_in_memory(key(1)));
        assert!(cache.contains_on_disk(key(1)));
        let stats = cache.stats();
        assert_eq!(stats.decodes, 1);
        assert_eq!(stats.disk_writes, 1);
    }

    #[test]
    fn test_disk_hit_promotes_to_memory() {
        let store = Arc::new(CountingStore::new());
        store.insert_png("a", &split_image(64, 48));
        let (cache, _dir) = manager(Arc::clone(&store));

        cache.get_thumbnail(key(1), &source("a")).unwrap();
        cache.flush();
        cache.clear_memory();

        let from_disk = cache.get_thumbnail(key(1), &source("a")).unwrap();
        let after_disk = cache.stats();
        assert_eq!(after_disk.disk_hits, 1);
        assert_eq!(store.opens(), 1);
        assert!(cache.contains_in_memory(key(1)));

        let from_memory = cache.get_thumbnail(key(1), &source("a")).unwrap();
        let delta = cache.stats().since(&after_disk);
        assert_eq!(delta.memory_hits, 1);
        assert_eq!(delta.disk_hits, 0);
        assert_eq!(delta.decodes, 0);
        assert_eq!(store.opens(), 1);
        assert!(from_memory.ptr_eq(&from_disk));
    }

    #[test]
    fn test_decode_failure_populates_nothing() {
        let store = Arc::new(CountingStore::new());
        let mut corrupt = encode_png(&split_image(32, 32));
        corrupt.truncate(corrupt.len() / 3);
        store.insert("bad", corrupt);
        let (cache, _dir) = manager(Arc::clone(&store));

        let err = cache.get_thumbnail(key(9), &source("bad")).unwrap_err();
        cache.flush();

        assert!(matches!(err, ThumbnailError::Decode { .. }));
        assert!(!cache.contains_in_memory(key(9)));
        assert!(!cache.contains_on_disk(key(9)));
        assert_eq!(cache.stats().decode_failures, 1);

        // No negative caching: a later request decodes again.
        assert!(cache.get_thumbnail(key(9), &source("bad")).is_err());
        assert_eq!(store.opens(), 2);
    }

    #[test]
    fn test_missing_source_is_reported() {
        let store = Arc::new(CountingStore::new());
        let (cache, _dir) = manager(store);

        let err = cache.get_thumbnail(key(3), &source("gone")).unwrap_err();
        assert!(matches!(err, ThumbnailError::SourceUnavailable { .. }));
        assert_eq!(cache.memory_entry_count(), 0);
    }

    #[test]
    fn test_corrupt_disk_entry_is_regenerated() {
        let store = Arc::new(CountingStore::new());
        store.insert_png("a", &split_image(64, 48));
        let (cache, dir) = manager(Arc::clone(&store));
        fs::write(dir.path().join("5.png"), b"not a png").unwrap();

        let thumb = cache.get_thumbnail(key(5), &source("a")).unwrap();
        cache.flush();

        assert_eq!(thumb.dimensions(), (THUMB, THUMB));
        let stats = cache.stats();
        assert_eq!(stats.disk_read_failures, 1);
        assert_eq!(stats.decodes, 1);
        // The rewritten file is valid again.
        let reread = DiskCache::new(dir.path(), None).load(key(5)).unwrap();
        assert_eq!(reread.map(|b| b.dimensions()), Some((THUMB, THUMB)));
    }

    #[test]
    fn test_stale_size_on_disk_is_regenerated() {
        let store = Arc::new(CountingStore::new());
        store.insert_png("a", &split_image(64, 48));

        let dir = tempdir().unwrap();
        let disk = DiskCache::new(dir.path(), None);
        disk.save(key(2), &ThumbnailBuffer::new(split_image(8, 8))).unwrap();

        let cache = ThumbnailCacheManager::builder()
            .cache_dir(dir.path())
            .memory_budget(CacheBudget::from_bytes(1 << 20))
            .thumb_size(THUMB)
            .build(Arc::clone(&store) as Arc<dyn ImageStore>)
            .unwrap();

        let thumb = cache.get_thumbnail(key(2), &source("a")).unwrap();
        assert_eq!(thumb.dimensions(), (THUMB, THUMB));
        assert_eq!(store.opens(), 1);
    }

    #[test]
    fn test_disk_write_failure_is_absorbed() {
        let store = Arc::new(CountingStore::new());
        store.insert_png("a", &split_image(64, 48));

        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, b"x").unwrap();
        let cache = ThumbnailCacheManager::builder()
            .cache_dir(&blocker)
            .memory_budget(CacheBudget::from_bytes(1 << 20))
            .thumb_size(THUMB)
            .build(store)
            .unwrap();

        let thumb = cache.get_thumbnail(key(1), &source("a"));
        cache.flush();

        assert!(thumb.is_ok());
        assert!(cache.contains_in_memory(key(1)));
        assert_eq!(cache.stats().disk_write_failures, 1);
    }

    #[test]
    fn test_concurrent_requests_decode_once() {
        let store = Arc::new(CountingStore::with_delay(Duration::from_millis(100)));
        store.insert_png("slow", &split_image(64, 64));
        let (cache, _dir) = manager(Arc::clone(&store));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.get_thumbnail(key(77), &source("slow")))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(store.opens(), 1);
        assert_eq!(cache.stats().decodes, 1);
    }

    #[test]
    fn test_distinct_keys_load_independently() {
        let store = Arc::new(CountingStore::new());
        store.insert_png("a", &split_image(64, 48));
        store.insert_png("b", &split_image(48, 64));
        let (cache, _dir) = manager(Arc::clone(&store));

        let a = cache.get_thumbnail(key(1), &source("a")).unwrap();
        let b = cache.get_thumbnail(key(2), &source("b")).unwrap();

        assert!(!a.ptr_eq(&b));
        assert_eq!(store.opens(), 2);
        assert_eq!(cache.memory_entry_count(), 2);
    }

    #[test]
    fn test_invalidate_and_clear_all() {
        let store = Arc::new(CountingStore::new());
        store.insert_png("a", &split_image(64, 48));
        let (cache, _dir) = manager(Arc::clone(&store));

        cache.get_thumbnail(key(1), &source("a")).unwrap();
        cache.get_thumbnail(key(2), &source("a")).unwrap();
        cache.flush();

        assert!(cache.invalidate(key(1)));
        assert!(!cache.contains_in_memory(key(1)));
        assert!(!cache.contains_on_disk(key(1)));
        assert!(!cache.invalidate(key(1)));

        cache.clear_all().unwrap();
        assert_eq!(cache.memory_usage(), 0);
        assert!(!cache.contains_on_disk(key(2)));
    }

    #[test]
    fn test_large_rotated_photo_scenario() {
        // 4000x3000 source reported at 90 degrees, default 200px thumbnails.
        let store = Arc::new(CountingStore::new());
        store.insert("photo-42", encode(&split_image(4000, 3000), ImageFormat::Bmp));
        let (cache, _dir) = manager_with(Arc::clone(&store), 200);
        let photo_source = SourceDescriptor::new("photo-42", Orientation::from_degrees(90));

        let first = cache.get_thumbnail(key(42), &photo_source).unwrap();
        cache.flush();

        assert_eq!(first.dimensions(), (200, 200));
        assert!(cache.contains_in_memory(key(42)));
        assert!(cache.contains_on_disk(key(42)));
        // Rotated clockwise, the red left half now sits on top.
        let top = first.image().get_pixel(100, 10);
        let bottom = first.image().get_pixel(100, 190);
        assert!(top[0] > 200 && top[2] < 50);
        assert!(bottom[2] > 200 && bottom[0] < 50);

        let before = cache.stats();
        let second = cache.get_thumbnail(key(42), &photo_source).unwrap();
        let delta = cache.stats().since(&before);

        assert!(second.ptr_eq(&first));
        assert_eq!(delta.memory_hits, 1);
        assert_eq!(delta.disk_hits, 0);
        assert_eq!(delta.decodes, 0);
        assert_eq!(store.opens(), 1);
    }

    #[test]
    fn test_photo_lookup_uses_photo_id() {
        let store = Arc::new(CountingStore::new());
        store.insert_png("p", &split_image(20, 20));
        let (cache, _dir) = manager(Arc::clone(&store));

        let photo = Photo::new(77, "p", Orientation::from_degrees(90));
        cache.get_photo_thumbnail(&photo).unwrap();

        assert!(cache.contains_in_memory(key(77)));
        assert!(cache.get_cached(photo.key()).is_some());
    }

    #[test]
    fn test_builder_config_defaults() {
        let dir = tempdir().unwrap();
        let config = ThumbnailCacheBuilder::new()
            .cache_dir(dir.path())
            .disk_budget_mb(2)
            .config()
            .unwrap();

        assert_eq!(config.thumb_size, 200);
        assert_eq!(config.disk_budget, Some(2 * 1024 * 1024));
        assert!(config.memory_budget.bytes() >= 16 * 1024 * 1024);
    }
}
