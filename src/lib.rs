//! Two-tier thumbnail cache for a scrolling photo grid.
//!
//! Thumbnails are served from a byte-bounded memory LRU, then from PNG files
//! in a cache directory, and only decoded from the original photo when both
//! miss. Each slower hit warms the faster tiers.

pub mod bench;
pub mod error;
pub mod image_loader;
pub mod models;
pub mod scanner;
pub mod thumbnails;

#[cfg(test)]
mod testing;

pub use error::{DiskCacheError, ThumbnailError};
pub use image_loader::{FileImageStore, ImageStore, InMemoryImageStore};
pub use models::{Orientation, Photo, SourceDescriptor};
pub use thumbnails::{ThumbnailBuffer, ThumbnailCacheManager, ThumbnailKey};
