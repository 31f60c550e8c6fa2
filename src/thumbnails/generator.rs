//! Thumbnail generation using the image crate.
//!
//! Decodes the original photo, rotates the full-resolution image upright, then
//! center-crops and scales it to a fixed square. Rotation happens before the
//! downscale so thumbnailing always sees correctly oriented pixels.

use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use tracing::{debug, trace};

use super::buffer::ThumbnailBuffer;
use crate::error::ThumbnailError;
use crate::image_loader::{self, ImageStore};
use crate::models::{Orientation, SourceDescriptor};

/// Default edge length of square thumbnails in pixels.
pub const DEFAULT_THUMB_SIZE: u32 = 200;

/// Filter used for the final downscale. Triangle keeps large sources cheap.
const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Fill for the corners exposed by a free rotation.
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Stateless thumbnail decoder.
pub struct ThumbnailGenerator;

impl ThumbnailGenerator {
    /// Decode `source` into a `size` thumbnail (width, height).
    pub fn decode_thumbnail(
        store: &dyn ImageStore,
        source: &SourceDescriptor,
        size: (u32, u32),
    ) -> Result<ThumbnailBuffer, ThumbnailError> {
        let (width, height) = size;
        debug!(
            handle = %source.handle,
            orientation = source.orientation.degrees(),
            width,
            height,
            "Generating thumbnail"
        );

        let oriented = Self::load_full_size(store, source)?;
        let thumbnail = Self::extract_thumbnail(&oriented, width, height);
        // Release the full-resolution pixels before handing the result out.
        drop(oriented);

        Ok(ThumbnailBuffer::new(thumbnail))
    }

    /// Decode `source` at full resolution and rotate it upright.
    pub fn load_full_size(
        store: &dyn ImageStore,
        source: &SourceDescriptor,
    ) -> Result<DynamicImage, ThumbnailError> {
        let bytes = image_loader::read_source(store, &source.handle)
            .map_err(|e| ThumbnailError::source_unavailable(&source.handle, e))?;
        let decoded = image_loader::decode_bytes(&bytes)
            .map_err(|e| ThumbnailError::decode(&source.handle, format!("{e:#}")))?;
        drop(bytes);

        trace!(
            handle = %source.handle,
            width = decoded.width(),
            height = decoded.height(),
            "Decoded source image"
        );

        Ok(Self::rotate(decoded, source.orientation))
    }

    /// Rotate clockwise by `orientation`, consuming the input.
    pub fn rotate(img: DynamicImage, orientation: Orientation) -> DynamicImage {
        match orientation.quarter_turns() {
            Some(0) => img,
            Some(1) => img.rotate90(),
            Some(2) => img.rotate180(),
            Some(3) => img.rotate270(),
            _ => {
                let rgba = img.into_rgba8();
                DynamicImage::ImageRgba8(rotate_free(&rgba, orientation.degrees() as f64))
            }
        }
    }

    /// Scale so the image covers `width` x `height`, then crop the center.
    pub fn extract_thumbnail(img: &DynamicImage, width: u32, height: u32) -> RgbaImage {
        img.resize_to_fill(width.max(1), height.max(1), RESIZE_FILTER)
            .into_rgba8()
    }
}

/// Rotate by an arbitrary clockwise angle into the rotated bounding box.
///
/// Nearest-neighbour sampling; pixels outside the source stay transparent.
fn rotate_free(src: &RgbaImage, degrees: f64) -> RgbaImage {
    let (src_w, src_h) = src.dimensions();
    let theta = degrees.to_radians();
    let (sin, cos) = theta.sin_cos();

    let dst_w = (src_w as f64 * cos.abs() + src_h as f64 * sin.abs()).round() as u32;
    let dst_h = (src_w as f64 * sin.abs() + src_h as f64 * cos.abs()).round() as u32;
    let (dst_w, dst_h) = (dst_w.max(1), dst_h.max(1));

    let src_cx = src_w as f64 / 2.0;
    let src_cy = src_h as f64 / 2.0;
    let dst_cx = dst_w as f64 / 2.0;
    let dst_cy = dst_h as f64 / 2.0;

    RgbaImage::from_fn(dst_w, dst_h, |x, y| {
        // Inverse-map the destination pixel center into the source (y axis points down).
        let dx = x as f64 + 0.5 - dst_cx;
        let dy = y as f64 + 0.5 - dst_cy;
        let sx = dx * cos + dy * sin + src_cx;
        let sy = -dx * sin + dy * cos + src_cy;
        if sx < 0.0 || sy < 0.0 {
            return TRANSPARENT;
        }
        let (sx, sy) = (sx.floor() as u32, sy.floor() as u32);
        if sx < src_w && sy < src_h {
            *src.get_pixel(sx, sy)
        } else {
            TRANSPARENT
        }
    })
}
