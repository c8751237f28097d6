//! Directory walking implementation using walkdir.

use super::{filter::MediaFilter, MediaScanner, ScanResult, SourceFile};
use crate::error::ScanError;
use crate::events::{Event, EventSender, ScanEvent};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Configuration for the source scanner
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Whether to include hidden files and directories
    pub include_hidden: bool,
    /// Custom extensions to include (None = use defaults)
    pub extensions: Option<Vec<String>>,
    /// Canonical directories never descended into (e.g. a destination inside the source)
    pub exclude: Vec<PathBuf>,
}

/// Scanner implementation using the walkdir crate
pub struct WalkDirScanner {
    config: ScanConfig,
    filter: MediaFilter,
}

impl WalkDirScanner {
    /// Create a new scanner with the given configuration
    pub fn new(config: ScanConfig) -> Self {
        let mut filter = MediaFilter::new().with_hidden(config.include_hidden);

        if let Some(ref extensions) = config.extensions {
            filter = filter.with_extensions(extensions.clone());
        }

        Self { config, filter }
    }

    fn descend_into(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        if self.filter.is_hidden(entry.path()) {
            return false;
        }
        !self.config.exclude.iter().any(|ex| entry.path() == ex)
    }

    fn scan_root(&self, root: &Path, events: &EventSender) -> Result<ScanResult, ScanError> {
        let root = fs::canonicalize(root).map_err(|_| ScanError::SourceNotFound {
            path: root.to_path_buf(),
        })?;
        if !root.is_dir() {
            return Err(ScanError::SourceNotFound { path: root });
        }

        let mut result = ScanResult::default();
        let walker = WalkDir::new(&root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.descend_into(e));

        for entry_result in walker {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    let error = if e.io_error().map(|io| io.kind())
                        == Some(std::io::ErrorKind::PermissionDenied)
                    {
                        ScanError::PermissionDenied { path: path.clone() }
                    } else {
                        ScanError::ReadDirectory {
                            path: path.clone(),
                            source: std::io::Error::from(e),
                        }
                    };
                    warn!(path = %path.display(), "scan error: {error}");
                    events.send(Event::Scan(ScanEvent::Error {
                        path,
                        message: error.to_string(),
                    }));
                    result.errors.push(error);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if self.filter.is_hidden(path) {
                continue;
            }
            if !self.filter.is_media(path) {
                debug!(path = %path.display(), "skipping non-media file");
                result.skipped_non_media += 1;
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => result.files.push(SourceFile {
                    path: path.to_path_buf(),
                    size: metadata.len(),
                    modified: metadata.modified().ok(),
                    kind: self.filter.kind(path),
                }),
                Err(e) => {
                    let error = ScanError::ReadDirectory {
                        path: path.to_path_buf(),
                        source: std::io::Error::from(e),
                    };
                    events.send(Event::Scan(ScanEvent::Error {
                        path: path.to_path_buf(),
                        message: error.to_string(),
                    }));
                    result.errors.push(error);
                }
            }
        }

        Ok(result)
    }
}

impl MediaScanner for WalkDirScanner {
    fn scan(&self, root: &Path) -> Result<ScanResult, ScanError> {
        self.scan_with_events(root, &crate::events::null_sender())
    }

    fn scan_with_events(
        &self,
        root: &Path,
        events: &EventSender,
    ) -> Result<ScanResult, ScanError> {
        events.send(Event::Scan(ScanEvent::Started {
            root: root.to_path_buf(),
        }));

        let result = self.scan_root(root, events)?;

        events.send(Event::Scan(ScanEvent::Completed {
            total_files: result.files.len(),
            skipped_non_media: result.skipped_non_media,
        }));

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::MediaKind;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(&[0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        path
    }

    #[test]
    fn scan_empty_directory_returns_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let scanner = WalkDirScanner::new(ScanConfig::default());

        let result = scanner.scan(temp_dir.path()).unwrap();

        assert!(result.files.is_empty());
        assert!(result.errors.is_empty());
        assert_eq!(result.skipped_non_media, 0);
    }

    #[test]
    fn scan_finds_nested_media_and_counts_the_rest() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("2019").join("trip");
        fs::create_dir_all(&nested).unwrap();

        create_file(temp_dir.path(), "root.jpg");
        create_file(&nested, "clip.MOV");
        create_file(&nested, "notes.txt");

        let scanner = WalkDirScanner::new(ScanConfig::default());
        let result = scanner.scan(temp_dir.path()).unwrap();

        assert_eq!(result.files.len(), 2);
        assert_eq!(result.skipped_non_media, 1);
        assert!(result.files.iter().any(|f| f.kind == MediaKind::Video));
        assert!(result.files.iter().all(|f| f.size == 4));
    }

    #[test]
    fn scan_skips_hidden_directories() {
        let temp_dir = TempDir::new().unwrap();
        let hidden = temp_dir.path().join(".thumbnails");
        fs::create_dir_all(&hidden).unwrap();
        create_file(&hidden, "thumb.jpg");
        create_file(temp_dir.path(), "visible.jpg");

        let scanner = WalkDirScanner::new(ScanConfig::default());
        let result = scanner.scan(temp_dir.path()).unwrap();

        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].path.ends_with("visible.jpg"));
    }

    #[test]
    fn scan_never_descends_into_excluded_directory() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("archive");
        fs::create_dir_all(&archive).unwrap();
        create_file(&archive, "already_archived.jpg");
        create_file(temp_dir.path(), "new.jpg");

        let config = ScanConfig {
            exclude: vec![fs::canonicalize(&archive).unwrap()],
            ..Default::default()
        };
        let result = WalkDirScanner::new(config).scan(temp_dir.path()).unwrap();

        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].path.ends_with("new.jpg"));
    }

    #[test]
    fn scan_nonexistent_root_is_an_error() {
        let scanner = WalkDirScanner::new(ScanConfig::default());
        let result = scanner.scan(Path::new("/nonexistent/path/12345"));

        assert!(matches!(result, Err(ScanError::SourceNotFound { .. })));
    }
}
