use std::fmt;
use std::sync::Arc;

use image::RgbaImage;

/// Bytes per pixel of decoded RGBA8 thumbnails.
const BYTES_PER_PIXEL: usize = 4;

/// A decoded, oriented thumbnail ready for display.
///
/// Pixels are shared behind an `Arc` so handing a buffer to the memory tier,
/// the disk writer and the caller does not copy them. Buffers are never
/// mutated; a re-fetch produces a new one.
#[derive(Clone)]
pub struct ThumbnailBuffer {
    image: Arc<RgbaImage>,
}

impl ThumbnailBuffer {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Size charged against the memory budget.
    pub fn byte_size(&self) -> usize {
        (self.width() as usize) * (self.height() as usize) * BYTES_PER_PIXEL
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Raw RGBA8 pixel data, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Whether two buffers share the same pixel allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

impl fmt::Debug for ThumbnailBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThumbnailBuffer")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("bytes", &self.byte_size())
            .finish()
    }
}

impl From<RgbaImage> for ThumbnailBuffer {
    fn from(image: RgbaImage) -> Self {
        Self::new(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size_counts_rgba_pixels() {
        let buffer = ThumbnailBuffer::new(RgbaImage::new(200, 200));
        assert_eq!(buffer.byte_size(), 200 * 200 * 4);
        assert_eq!(buffer.as_raw().len(), buffer.byte_size());
    }

    #[test]
    fn test_clone_shares_pixels() {
        let buffer = ThumbnailBuffer::new(RgbaImage::new(4, 4));
        let clone = buffer.clone();
        assert!(buffer.ptr_eq(&clone));
        assert!(!buffer.ptr_eq(&ThumbnailBuffer::new(RgbaImage::new(4, 4))));
    }
}
