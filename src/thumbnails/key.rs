use std::fmt;

/// Extension of encoded thumbnails in the disk cache.
pub const DISK_EXTENSION: &str = "png";

/// Cache key for thumbnail lookups.
///
/// Wraps the photo's numeric id directly so a photo keeps its key across
/// runs and rescans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThumbnailKey(u64);

impl ThumbnailKey {
    pub fn from_photo_id(id: u64) -> Self {
        Self(id)
    }

    pub fn photo_id(self) -> u64 {
        self.0
    }

    /// Get the filename for disk cache storage.
    pub fn disk_filename(self) -> String {
        format!("{}.{}", self.0, DISK_EXTENSION)
    }

    /// Parse a disk cache filename back into a key.
    pub fn from_disk_filename(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(DISK_EXTENSION)?.strip_suffix('.')?;
        stem.parse().ok().map(Self)
    }
}

impl fmt::Display for ThumbnailKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ThumbnailKey {
    fn from(id: u64) -> Self {
        Self::from_photo_id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable_and_distinct() {
        assert_eq!(ThumbnailKey::from_photo_id(42), ThumbnailKey::from(42));
        assert_ne!(ThumbnailKey::from_photo_id(42), ThumbnailKey::from_photo_id(43));
    }

    #[test]
    fn test_disk_filename() {
        let key = ThumbnailKey::from_photo_id(42);
        assert_eq!(key.disk_filename(), "42.png");
        assert_eq!(ThumbnailKey::from_disk_filename("42.png"), Some(key));
        assert_eq!(ThumbnailKey::from_disk_filename("42.png.tmp"), None);
        assert_eq!(ThumbnailKey::from_disk_filename("notes.png"), None);
    }
}
