//! File filtering logic for the scanner.

use super::MediaKind;
use std::collections::HashSet;
use std::path::Path;

/// Default archived extensions (photos, raw and videos)
const DEFAULT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "tif", "tiff", "webp", "heic", "heif", "bmp", "gif", "dng", "cr2",
    "nef", "arw", "raf", "mp4", "mov", "m4v", "mkv", "avi", "wmv", "mts", "m2ts", "3gp", "webm",
];

/// Decides which files are media worth archiving
pub struct MediaFilter {
    /// File extensions to include, lowercase
    extensions: HashSet<String>,
    /// Whether to include hidden files
    include_hidden: bool,
}

impl MediaFilter {
    /// Create a new filter with the default media extensions
    pub fn new() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            include_hidden: false,
        }
    }

    /// Include hidden files (starting with .)
    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Override the list of extensions to accept
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Whether a name is hidden and should be skipped
    pub fn is_hidden(&self, path: &Path) -> bool {
        !self.include_hidden
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with('.'))
    }

    /// Check if a file's extension is one we archive
    pub fn is_media(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }

    /// Get the media kind for a path
    pub fn kind(&self, path: &Path) -> MediaKind {
        MediaKind::from_path(path)
    }
}

impl Default for MediaFilter {
    fn default() -> Self {
        Self::new()
    }
}
