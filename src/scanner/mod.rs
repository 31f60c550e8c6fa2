//! Photo discovery for the grid.

pub mod file_scanner;
pub mod metadata;

pub use file_scanner::{photo_id_for_path, FileScanner, ScanConfig, ScanResult};
pub use metadata::{MetadataExtractor, PhotoMetadata};
