use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced to callers of the thumbnail pipeline.
///
/// Both variants are terminal for the current request: the grid shows a
/// placeholder and a later request starts from scratch. The error is `Clone`
/// so every caller waiting on the same in-flight decode receives it.
#[derive(Debug, Clone, Error)]
pub enum ThumbnailError {
    /// The image store could not open a byte stream for the handle.
    #[error("Failed to open image source {handle}: {reason}")]
    SourceUnavailable { handle: String, reason: String },

    /// The bytes were read but are not a decodable image.
    #[error("Failed to decode image {handle}: {reason}")]
    Decode { handle: String, reason: String },
}

impl ThumbnailError {
    pub(crate) fn source_unavailable(handle: &str, err: impl ToString) -> Self {
        Self::SourceUnavailable {
            handle: handle.to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn decode(handle: &str, err: impl ToString) -> Self {
        Self::Decode {
            handle: handle.to_string(),
            reason: err.to_string(),
        }
    }

    /// The source handle the failed request referred to.
    pub fn handle(&self) -> &str {
        match self {
            Self::SourceUnavailable { handle, .. } | Self::Decode { handle, .. } => handle,
        }
    }
}

/// Errors raised by the disk tier.
///
/// The cache manager never hands these to its callers: read-side errors
/// degrade to a cache miss and write-side errors are logged by the writer.
#[derive(Debug, Error)]
pub enum DiskCacheError {
    #[error("Failed to read cached thumbnail {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cached thumbnail {path:?} is not a valid image: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode thumbnail for {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write cached thumbnail {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DiskCacheError {
    /// Path of the cache file involved.
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Read { path, .. }
            | Self::Decode { path, .. }
            | Self::Encode { path, .. }
            | Self::Write { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_error_keeps_handle() {
        let err = ThumbnailError::decode("/photos/a.jpg", "bad marker");
        assert_eq!(err.handle(), "/photos/a.jpg");
        assert!(err.to_string().contains("bad marker"));

        let err = ThumbnailError::source_unavailable("content://7", "permission denied");
        assert_eq!(err.handle(), "content://7");
        assert!(matches!(err, ThumbnailError::SourceUnavailable { .. }));
    }
}
