//! Byte sources for original photos and decoding of their contents.
//!
//! The thumbnail pipeline only needs "open a byte stream for this handle";
//! where the bytes live is up to the `ImageStore` implementation.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use image::{DynamicImage, ImageFormat};
use parking_lot::RwLock;

/// Read-only access to original photos by opaque handle.
pub trait ImageStore: Send + Sync {
    fn open(&self, handle: &str) -> io::Result<Box<dyn Read + Send + '_>>;
}

/// Image store whose handles are filesystem paths.
///
/// Relative handles resolve against `root` when one is set.
#[derive(Debug, Clone, Default)]
pub struct FileImageStore {
    root: Option<PathBuf>,
}

impl FileImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, handle: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(handle),
            None => PathBuf::from(handle),
        }
    }
}

impl ImageStore for FileImageStore {
    fn open(&self, handle: &str) -> io::Result<Box<dyn Read + Send + '_>> {
        let file = File::open(self.resolve(handle))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Image store holding encoded photos in memory.
#[derive(Debug, Default)]
pub struct InMemoryImageStore {
    images: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: impl Into<String>, bytes: Vec<u8>) {
        self.images.write().insert(handle.into(), bytes);
    }

    pub fn remove(&self, handle: &str) -> bool {
        self.images.write().remove(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.images.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.read().is_empty()
    }
}

impl ImageStore for InMemoryImageStore {
    fn open(&self, handle: &str) -> io::Result<Box<dyn Read + Send + '_>> {
        let bytes = self.images.read().get(handle).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no image for {handle}"))
        })?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}

/// Read the whole stream for `handle` into memory.
pub fn read_source(store: &dyn ImageStore, handle: &str) -> io::Result<Vec<u8>> {
    let mut reader = store.open(handle)?;
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Decode encoded image bytes, taking the first frame of animated GIFs.
pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(bytes).ok();

    if format == Some(ImageFormat::Gif) {
        let decoder = GifDecoder::new(Cursor::new(bytes)).context("Failed to decode GIF")?;
        let mut frames = decoder.into_frames();
        if let Some(frame) = frames.next() {
            let frame = frame.context("Failed to decode GIF frame")?;
            return Ok(DynamicImage::ImageRgba8(frame.into_buffer()));
        }
        return Err(anyhow!("GIF has no frames"));
    }

    match format {
        Some(fmt) => {
            image::load_from_memory_with_format(bytes, fmt).context("Failed to decode image")
        }
        None => Err(anyhow!("Unrecognized image format")),
    }
}
