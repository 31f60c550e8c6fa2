//! Cache sizing and location defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use tracing::debug;

use super::generator::DEFAULT_THUMB_SIZE;

/// Default memory cache size in megabytes.
pub const DEFAULT_MEMORY_MB: usize = 64;

/// Minimum memory cache size in megabytes.
pub const MIN_MEMORY_MB: usize = 16;

/// Maximum memory cache size in megabytes.
pub const MAX_MEMORY_MB: usize = 512;

/// Share of available memory given to the thumbnail cache (1/8).
const MEMORY_FRACTION_DIVISOR: u64 = 8;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Byte ceiling for the memory tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheBudget(usize);

impl CacheBudget {
    /// Exact byte budget, unclamped.
    pub fn from_bytes(bytes: usize) -> Self {
        Self(bytes)
    }

    /// Budget in megabytes, clamped to `MIN_MEMORY_MB..=MAX_MEMORY_MB`.
    pub fn from_megabytes(mb: usize) -> Self {
        Self(mb.clamp(MIN_MEMORY_MB, MAX_MEMORY_MB) * BYTES_PER_MB)
    }

    /// An eighth of `available_bytes`, clamped like `from_megabytes`.
    pub fn fraction_of(available_bytes: u64) -> Self {
        let share = (available_bytes / MEMORY_FRACTION_DIVISOR) as usize;
        let min = MIN_MEMORY_MB * BYTES_PER_MB;
        let max = MAX_MEMORY_MB * BYTES_PER_MB;
        Self(share.clamp(min, max))
    }

    /// Derive the budget from the system's available memory, falling back to
    /// `DEFAULT_MEMORY_MB` when it cannot be determined.
    pub fn from_available_memory() -> Self {
        match available_memory_bytes() {
            Some(bytes) => {
                let budget = Self::fraction_of(bytes);
                debug!(available_bytes = bytes, budget_bytes = budget.0, "Sized memory cache");
                budget
            }
            None => Self::default(),
        }
    }

    pub fn bytes(self) -> usize {
        self.0
    }
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self::from_megabytes(DEFAULT_MEMORY_MB)
    }
}

/// Settings for a `ThumbnailCacheManager`.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Flat directory holding `<id>.png` files.
    pub cache_dir: PathBuf,
    pub memory_budget: CacheBudget,
    /// Optional cap on the disk tier in bytes; `None` keeps every entry.
    pub disk_budget: Option<u64>,
    /// Edge length of the square thumbnails.
    pub thumb_size: u32,
}

impl CacheConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            memory_budget: CacheBudget::default(),
            disk_budget: None,
            thumb_size: DEFAULT_THUMB_SIZE,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Get the default cache directory path.
pub fn default_cache_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("", "", "thumbgrid")
        .context("Failed to determine project directories")?;
    Ok(proj_dirs.cache_dir().join("thumbs"))
}

/// `MemAvailable` from /proc/meminfo, in bytes.
fn available_memory_bytes() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_available(&meminfo)
}

fn parse_meminfo_available(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find_map(|line| line.strip_prefix("MemAvailable:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_limit_clamping() {
        assert_eq!(CacheBudget::from_megabytes(1).bytes(), MIN_MEMORY_MB * BYTES_PER_MB);
        assert_eq!(CacheBudget::from_megabytes(4096).bytes(), MAX_MEMORY_MB * BYTES_PER_MB);
        assert_eq!(CacheBudget::from_megabytes(200).bytes(), 200 * BYTES_PER_MB);
        assert_eq!(CacheBudget::from_bytes(1234).bytes(), 1234);
    }

    #[test]
    fn test_fraction_of_available() {
        let gib = 1024 * 1024 * 1024u64;
        assert_eq!(CacheBudget::fraction_of(2 * gib).bytes(), 256 * BYTES_PER_MB);
        assert_eq!(CacheBudget::fraction_of(0).bytes(), MIN_MEMORY_MB * BYTES_PER_MB);
        assert_eq!(CacheBudget::fraction_of(64 * gib).bytes(), MAX_MEMORY_MB * BYTES_PER_MB);
    }

    #[test]
    fn test_parse_meminfo() {
        let sample = "MemTotal:       16318412 kB\nMemFree:         1234567 kB\nMemAvailable:    8000000 kB\n";
        assert_eq!(parse_meminfo_available(sample), Some(8_000_000 * 1024));
        assert_eq!(parse_meminfo_available("MemTotal: 1 kB\n"), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = CacheConfig::new("/tmp/thumbs");
        assert_eq!(config.thumb_size, DEFAULT_THUMB_SIZE);
        assert_eq!(config.memory_budget, CacheBudget::from_megabytes(DEFAULT_MEMORY_MB));
        assert!(config.disk_budget.is_none());
        assert_eq!(config.cache_dir(), Path::new("/tmp/thumbs"));
    }
}
