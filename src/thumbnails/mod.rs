//! Thumbnail pipeline for the thumbgrid photo grid.
//!
//! This module provides:
//! - `ThumbnailCacheManager` - Memory, then disk, then decode, warming tiers on the way back
//! - `MemoryCache` / `DiskCache` - The two cache tiers
//! - `ThumbnailGenerator` - Decodes, orients and crops source images
//! - `ThumbnailQueue` - Worker pool for concurrent grid requests

pub mod buffer;
pub mod cache;
pub mod config;
pub mod disk;
pub mod generator;
pub mod inflight;
pub mod key;
pub mod memory;
pub mod queue;
pub mod stats;
pub mod writer;

pub use buffer::ThumbnailBuffer;
pub use cache::{ThumbnailCacheBuilder, ThumbnailCacheManager};
pub use config::{CacheBudget, CacheConfig};
pub use disk::DiskCache;
pub use generator::ThumbnailGenerator;
pub use key::ThumbnailKey;
pub use memory::MemoryCache;
pub use queue::{ThumbnailQueue, ThumbnailRequest, ThumbnailResult};
pub use stats::CacheStatsSnapshot;
