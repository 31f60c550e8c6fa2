//! Header-only metadata extraction for photos.
//!
//! Reads dimensions and EXIF orientation without decoding pixel data.

use std::path::Path;

use anyhow::{Context, Result};
use image::{ImageDecoder, ImageReader};
use tracing::{trace, warn};

use crate::models::Orientation;

/// Error state marker for broken image files.
pub const ERROR_DIMENSION: u32 = 0;

/// Header metadata of one photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoMetadata {
    /// Stored width in pixels, before orientation.
    pub width: u32,
    /// Stored height in pixels, before orientation.
    pub height: u32,
    pub orientation: Orientation,
}

impl PhotoMetadata {
    /// Placeholder for files whose header cannot be read.
    pub const BROKEN: Self = Self {
        width: ERROR_DIMENSION,
        height: ERROR_DIMENSION,
        orientation: Orientation::UPRIGHT,
    };

    pub fn is_broken(&self) -> bool {
        self.width == ERROR_DIMENSION || self.height == ERROR_DIMENSION
    }
}

pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Extracts metadata, returning [`PhotoMetadata::BROKEN`] for unreadable
    /// files so the grid can still show a placeholder for them.
    pub fn extract(path: &Path) -> PhotoMetadata {
        match Self::read_header(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Failed to read image header for {:?}: {:#}", path, e);
                PhotoMetadata::BROKEN
            }
        }
    }

    fn read_header(path: &Path) -> Result<PhotoMetadata> {
        trace!("Reading image header from {:?}", path);

        let reader = ImageReader::open(path)
            .with_context(|| format!("Failed to open {:?}", path))?
            .with_guessed_format()
            .with_context(|| format!("Failed to sniff format of {:?}", path))?;
        let mut decoder = reader.into_decoder().context("Unsupported image format")?;

        let (width, height) = decoder.dimensions();
        // Formats without EXIF support report no transform.
        let orientation = decoder
            .orientation()
            .map(Orientation::from)
            .unwrap_or(Orientation::UPRIGHT);

        trace!(width, height, degrees = orientation.degrees(), "Read image header");
        Ok(PhotoMetadata {
            width,
            height,
            orientation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::encode_png;
    use image::RgbaImage;
    use tempfile::tempdir;

    #[test]
    fn test_png_dimensions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wide.png");
        std::fs::write(&path, encode_png(&RgbaImage::new(30, 20))).unwrap();

        let metadata = MetadataExtractor::extract(&path);
        assert_eq!((metadata.width, metadata.height), (30, 20));
        assert_eq!(metadata.orientation, Orientation::UPRIGHT);
        assert!(!metadata.is_broken());
    }

    #[test]
    fn test_nonexistent_image() {
        let metadata = MetadataExtractor::extract(Path::new("/nonexistent/image.jpg"));
        assert_eq!(metadata, PhotoMetadata::BROKEN);
    }

    #[test]
    fn test_corrupt_image_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.png");
        std::fs::write(&path, b"not an image at all").unwrap();

        assert!(MetadataExtractor::extract(&path).is_broken());
    }
}
