use crate::thumbnails::key::ThumbnailKey;

/// Rotation, in degrees clockwise, that presents a photo upright.
///
/// Device-reported angles are normalized into `0..360`; any multiple of 90
/// is a quarter turn, anything else a free rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Orientation(u16);

impl Orientation {
    pub const UPRIGHT: Self = Self(0);

    pub fn from_degrees(degrees: i32) -> Self {
        Self(degrees.rem_euclid(360) as u16)
    }

    pub fn degrees(self) -> u16 {
        self.0
    }

    /// Number of clockwise quarter turns, if the angle is a multiple of 90.
    pub fn quarter_turns(self) -> Option<u8> {
        if self.0 % 90 == 0 {
            Some((self.0 / 90) as u8)
        } else {
            None
        }
    }

    /// Whether the rotation swaps width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(self.quarter_turns(), Some(1) | Some(3))
    }
}

impl From<image::metadata::Orientation> for Orientation {
    /// Mirrored EXIF variants keep only their rotation component.
    fn from(value: image::metadata::Orientation) -> Self {
        use image::metadata::Orientation as Exif;
        let degrees = match value {
            Exif::NoTransforms | Exif::FlipHorizontal => 0,
            Exif::Rotate90 | Exif::Rotate90FlipH => 90,
            Exif::Rotate180 | Exif::FlipVertical => 180,
            Exif::Rotate270 | Exif::Rotate270FlipH => 270,
        };
        Self::from_degrees(degrees)
    }
}

/// Everything needed to decode a thumbnail from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceDescriptor {
    /// Opaque handle understood by the image store (a path for files).
    pub handle: String,
    pub orientation: Orientation,
}

impl SourceDescriptor {
    pub fn new(handle: impl Into<String>, orientation: Orientation) -> Self {
        Self {
            handle: handle.into(),
            orientation,
        }
    }
}

/// A photo as listed by the media index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub id: u64,
    pub handle: String,
    pub orientation: Orientation,
    pub width: u32,
    pub height: u32,
}

impl Photo {
    pub fn new(id: u64, handle: impl Into<String>, orientation: Orientation) -> Self {
        Self {
            id,
            handle: handle.into(),
            orientation,
            width: 0,
            height: 0,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Cache key for this photo's thumbnail.
    pub fn key(&self) -> ThumbnailKey {
        ThumbnailKey::from_photo_id(self.id)
    }

    pub fn source(&self) -> SourceDescriptor {
        SourceDescriptor::new(self.handle.clone(), self.orientation)
    }

    /// Dimensions as displayed, after orientation is applied.
    pub fn display_dimensions(&self) -> (u32, u32) {
        if self.orientation.swaps_dimensions() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}
