//! Directory scanner that builds the photo list for the grid.
//!
//! This module provides the `FileScanner` struct which handles:
//! - Recursive directory scanning using walkdir
//! - Image detection by file extension
//! - Header metadata extraction (dimensions and orientation)
//! - Stable photo ids derived from the file path

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use xxhash_rust::xxh3::xxh3_64;

use crate::models::Photo;
use crate::scanner::metadata::MetadataExtractor;

/// Configuration for the file scanner.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Whether to scan directories recursively.
    pub recursive: bool,
    /// Maximum directory depth (0 = unlimited).
    pub max_depth: usize,
    /// Whether to follow symbolic links.
    pub follow_symlinks: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            max_depth: 0, // unlimited
            follow_symlinks: false,
        }
    }
}

/// Summary of a completed scan.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub total_files: usize,
    /// Files whose header could not be read; listed with zero dimensions.
    pub broken_files: usize,
    pub elapsed_ms: u64,
}

pub fn is_image_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "jpg" | "jpeg" | "png" | "webp" | "gif" | "bmp" | "tiff" | "tif"
    )
}

/// Stable id for the photo at `path`; also names its disk thumbnail.
pub fn photo_id_for_path(path: &Path) -> u64 {
    xxh3_64(path.as_os_str().as_encoded_bytes())
}

pub struct FileScanner {
    config: ScanConfig,
}

impl FileScanner {
    pub fn new() -> Self {
        Self::with_config(ScanConfig::default())
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Scan `dir` for photos, sorted by path.
    pub fn scan(&self, dir: &Path) -> Result<(Vec<Photo>, ScanResult)> {
        if !dir.is_dir() {
            bail!("Not a directory: {:?}", dir);
        }

        let start = Instant::now();
        info!("Scanning {:?}", dir);

        let paths = Self::discover_files(dir, &self.config);
        let mut result = ScanResult {
            total_files: paths.len(),
            ..Default::default()
        };

        let photos: Vec<Photo> = paths
            .into_iter()
            .map(|path| {
                let metadata = MetadataExtractor::extract(&path);
                if metadata.is_broken() {
                    result.broken_files += 1;
                }
                Photo::new(
                    photo_id_for_path(&path),
                    path.to_string_lossy().into_owned(),
                    metadata.orientation,
                )
                .with_dimensions(metadata.width, metadata.height)
            })
            .collect();

        result.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            "Scan complete: {} photos ({} unreadable) in {}ms",
            result.total_files, result.broken_files, result.elapsed_ms
        );

        Ok((photos, result))
    }

    /// Discovers all image files in a directory.
    fn discover_files(dir: &Path, config: &ScanConfig) -> Vec<PathBuf> {
        let mut walker = WalkDir::new(dir).follow_links(config.follow_symlinks);

        if !config.recursive {
            walker = walker.max_depth(1);
        } else if config.max_depth > 0 {
            walker = walker.max_depth(config.max_depth);
        }

        let mut paths = Vec::new();

        for entry in walker.into_iter() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }

            let ext = entry.path().extension().and_then(|e| e.to_str()).unwrap_or("");
            if !is_image_extension(ext) {
                continue;
            }

            paths.push(entry.into_path());
        }

        // Sort by path for consistent ordering
        paths.sort();
        debug!(count = paths.len(), "Discovered image files");

        paths
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}
