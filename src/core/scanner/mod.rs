//! # Scanner Module
//!
//! Discovers media files in the source tree.
//!
//! ## Supported Formats
//! - Photos: JPEG, PNG, TIFF, WebP, HEIC/HEIF, BMP, GIF and common RAW formats
//! - Videos: MP4, MOV, M4V, MKV, AVI, WMV, MTS/M2TS, 3GP, WebM
//!
//! Anything else is counted as skipped, never touched.
//!
//! ## Example
//! ```rust,ignore
//! use media_archiver::core::scanner::{MediaScanner, ScanConfig, WalkDirScanner};
//!
//! let scanner = WalkDirScanner::new(ScanConfig::default());
//! let result = scanner.scan(Path::new("/Volumes/card"))?;
//! ```

mod filter;
mod walker;

pub use filter::MediaFilter;
pub use walker::{ScanConfig, WalkDirScanner};

use crate::error::ScanError;
use crate::events::EventSender;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A media file discovered in the source tree.
///
/// Read-only for the whole run: nothing in the engine writes to `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path to the file
    pub path: PathBuf,
    /// File size in bytes at discovery time
    pub size: u64,
    /// Last modified time, used only as a date fallback
    pub modified: Option<SystemTime>,
    /// Photo or video, from the extension
    pub kind: MediaKind,
}

impl SourceFile {
    /// The file name used for placement, exactly as on disk
    pub fn file_name(&self) -> &OsStr {
        self.path
            .file_name()
            .unwrap_or_else(|| OsStr::new("unnamed"))
    }
}

/// Broad media category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Photo,
    Video,
    Unknown,
}

impl MediaKind {
    /// Detect kind from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "tif" | "tiff" | "webp" | "heic" | "heif" | "bmp"
            | "gif" | "dng" | "cr2" | "nef" | "arw" | "raf" => MediaKind::Photo,
            "mp4" | "mov" | "m4v" | "mkv" | "avi" | "wmv" | "mts" | "m2ts" | "3gp" | "webm" => {
                MediaKind::Video
            }
            _ => MediaKind::Unknown,
        }
    }

    /// Detect kind from a path's extension
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(MediaKind::Unknown)
    }

    /// Check if this kind is archived at all
    pub fn is_supported(&self) -> bool {
        !matches!(self, MediaKind::Unknown)
    }
}

/// Result of a scan operation
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Media files found, in traversal order
    pub files: Vec<SourceFile>,
    /// Regular files skipped because they are not media
    pub skipped_non_media: usize,
    /// Subtrees or entries that could not be read (non-fatal)
    pub errors: Vec<ScanError>,
}

/// Trait for source tree scanners
pub trait MediaScanner: Send + Sync {
    /// Scan a source root
    fn scan(&self, root: &Path) -> Result<ScanResult, ScanError>;

    /// Scan with progress reporting via events
    fn scan_with_events(&self, root: &Path, events: &EventSender)
        -> Result<ScanResult, ScanError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_from_extension_is_case_insensitive() {
        assert_eq!(MediaKind::from_extension("JPG"), MediaKind::Photo);
        assert_eq!(MediaKind::from_extension("heic"), MediaKind::Photo);
        assert_eq!(MediaKind::from_extension("MOV"), MediaKind::Video);
        assert_eq!(MediaKind::from_extension("m2ts"), MediaKind::Video);
    }

    #[test]
    fn unknown_extension_is_not_supported() {
        assert_eq!(MediaKind::from_extension("pdf"), MediaKind::Unknown);
        assert!(!MediaKind::Unknown.is_supported());
        assert!(MediaKind::Video.is_supported());
    }

    #[test]
    fn path_without_extension_is_unknown() {
        assert_eq!(MediaKind::from_path(Path::new("/card/README")), MediaKind::Unknown);
    }
}
