//! Helpers shared by unit tests.

use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};

use crate::image_loader::{ImageStore, InMemoryImageStore};

pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

pub fn encode_png(img: &RgbaImage) -> Vec<u8> {
    encode(img, ImageFormat::Png)
}

pub fn encode(img: &RgbaImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// Left half red, right half blue.
pub fn split_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, _| if x < width / 2 { RED } else { BLUE })
}

/// Image store that counts opens and can stall each one.
#[derive(Default)]
pub struct CountingStore {
    inner: InMemoryImageStore,
    opens: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn insert(&self, handle: &str, bytes: Vec<u8>) {
        self.inner.insert(handle, bytes);
    }

    pub fn insert_png(&self, handle: &str, img: &RgbaImage) {
        self.insert(handle, encode_png(img));
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl ImageStore for CountingStore {
    fn open(&self, handle: &str) -> io::Result<Box<dyn Read + Send + '_>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.inner.open(handle)
    }
}
