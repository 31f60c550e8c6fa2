//! Persistent thumbnail cache in a flat directory.
//!
//! Each thumbnail is a lossless PNG named `<photo id>.png`. Writes go to a
//! temporary sibling and are renamed into place, so a reader never sees a
//! partially written file. With a byte budget set, files are pruned oldest
//! first by modification time, which loads refresh.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};
use tracing::{debug, trace, warn};

use super::buffer::ThumbnailBuffer;
use super::key::{ThumbnailKey, DISK_EXTENSION};
use crate::error::DiskCacheError;

/// Suffix appended to a cache filename while it is being written.
const TEMP_SUFFIX: &str = "tmp";

pub struct DiskCache {
    dir: PathBuf,
    max_bytes: Option<u64>,
}

/// A cache file found while scanning the directory.
struct DiskEntry {
    path: PathBuf,
    len: u64,
    modified: SystemTime,
}

impl DiskCache {
    /// Open a disk cache in `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>, max_bytes: Option<u64>) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(?dir, error = ?e, "Failed to create cache directory");
        }
        debug!(?dir, ?max_bytes, "Initialized disk cache");
        Self { dir, max_bytes }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> Option<u64> {
        self.max_bytes
    }

    /// Get the disk path for a cache key.
    pub fn path_for(&self, key: ThumbnailKey) -> PathBuf {
        self.dir.join(key.disk_filename())
    }

    pub fn contains(&self, key: ThumbnailKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Load a cached thumbnail.
    ///
    /// A missing file is `Ok(None)`; only an existing file that cannot be
    /// read or decoded is an error.
    pub fn load(&self, key: ThumbnailKey) -> Result<Option<ThumbnailBuffer>, DiskCacheError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(DiskCacheError::Read { path, source }),
        };

        let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .map_err(|source| DiskCacheError::Decode {
                path: path.clone(),
                source,
            })?
            .into_rgba8();

        if self.max_bytes.is_some() {
            touch(&path);
        }

        trace!(?path, "Loaded thumbnail from disk");
        Ok(Some(ThumbnailBuffer::new(image)))
    }

    /// Encode and store a thumbnail, replacing any previous file.
    pub fn save(&self, key: ThumbnailKey, buffer: &ThumbnailBuffer) -> Result<(), DiskCacheError> {
        let path = self.path_for(key);
        let temp_path = path.with_extension(format!("{DISK_EXTENSION}.{TEMP_SUFFIX}"));

        fs::create_dir_all(&self.dir).map_err(|source| DiskCacheError::Write {
            path: path.clone(),
            source,
        })?;

        if let Err(e) = write_png(&temp_path, buffer) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.with_path(path));
        }

        fs::rename(&temp_path, &path).map_err(|source| {
            let _ = fs::remove_file(&temp_path);
            DiskCacheError::Write {
                path: path.clone(),
                source,
            }
        })?;

        trace!(?path, "Saved thumbnail to disk");

        if self.max_bytes.is_some() {
            if let Err(e) = self.prune() {
                warn!(dir = ?self.dir, error = ?e, "Failed to prune disk cache");
            }
        }
        Ok(())
    }

    /// Remove a cached thumbnail. Returns whether a file was deleted.
    pub fn remove(&self, key: ThumbnailKey) -> io::Result<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete every cached thumbnail. Returns the number of files removed.
    pub fn clear(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in self.entries()? {
            if fs::remove_file(&entry.path).is_ok() {
                removed += 1;
            }
        }
        debug!(dir = ?self.dir, removed, "Cleared disk cache");
        Ok(removed)
    }

    /// Total size of cached thumbnails in bytes.
    pub fn usage(&self) -> io::Result<u64> {
        Ok(self.entries()?.iter().map(|e| e.len).sum())
    }

    /// Delete least recently used files until usage fits the budget.
    /// Returns the number of files removed.
    pub fn prune(&self) -> io::Result<usize> {
        let Some(max_bytes) = self.max_bytes else {
            return Ok(0);
        };

        let mut entries = self.entries()?;
        let mut usage: u64 = entries.iter().map(|e| e.len).sum();
        if usage <= max_bytes {
            return Ok(0);
        }

        entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));

        let mut removed = 0;
        for entry in entries {
            if usage <= max_bytes {
                break;
            }
            match fs::remove_file(&entry.path) {
                Ok(()) => {
                    usage = usage.saturating_sub(entry.len);
                    removed += 1;
                    trace!(path = ?entry.path, usage, "Pruned thumbnail from disk cache");
                }
                Err(e) => warn!(path = ?entry.path, error = ?e, "Failed to prune thumbnail"),
            }
        }

        debug!(removed, usage, max_bytes, "Pruned disk cache");
        Ok(removed)
    }

    /// Cache files in the directory, ignoring temporaries and foreign files.
    fn entries(&self) -> io::Result<Vec<DiskEntry>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for entry in read_dir.flatten() {
            let path = entry.path();
            let is_cache_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(ThumbnailKey::from_disk_filename)
                .is_some();
            if !is_cache_file {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            entries.push(DiskEntry {
                path,
                len: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        Ok(entries)
    }
}

/// Encode `buffer` as PNG at `path`.
fn write_png(path: &Path, buffer: &ThumbnailBuffer) -> Result<(), DiskCacheError> {
    let file = File::create(path).map_err(|source| DiskCacheError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);

    PngEncoder::new(&mut writer)
        .write_image(
            buffer.as_raw(),
            buffer.width(),
            buffer.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|source| DiskCacheError::Encode {
            path: path.to_path_buf(),
            source,
        })?;

    writer.flush().map_err(|source| DiskCacheError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Refresh a file's modification time so pruning treats it as recently used.
fn touch(path: &Path) {
    let result = File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(SystemTime::now()));
    if let Err(e) = result {
        trace!(?path, error = ?e, "Failed to refresh thumbnail mtime");
    }
}

impl DiskCacheError {
    /// Report the error against the final cache path rather than the temporary.
    fn with_path(self, path: PathBuf) -> Self {
        match self {
            Self::Read { source, .. } => Self::Read { path, source },
            Self::Decode { source, .. } => Self::Decode { path, source },
            Self::Encode { source, .. } => Self::Encode { path, source },
            Self::Write { source, .. } => Self::Write { path, source },
        }
    }
}
