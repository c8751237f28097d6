//! # Error Module
//!
//! Error types for the media archiver.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, line numbers, what went wrong
//! - **Per-file errors stay local** - they become quarantine outcomes, not failed runs
//! - **Recovery hints** - suggest how to fix when possible

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error for a run. Only setup failures surface here.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Destination {path} is not usable: {reason}")]
    Destination { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors that occur while enumerating the source tree
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Source directory not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A source file could not be read for fingerprinting
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File is empty (truncated?): {path}")]
    Empty { path: PathBuf },
}

/// One date source failed for one file. Never fatal.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("No {tag} tag present")]
    MissingTag { tag: &'static str },

    #[error("Corrupt container: {reason}")]
    CorruptContainer { reason: String },

    #[error("Unsupported format for {source_kind} metadata")]
    Unsupported { source_kind: &'static str },

    #[error("Implausible timestamp {value}")]
    Implausible { value: String },

    #[error("I/O error reading metadata: {0}")]
    Io(#[from] std::io::Error),
}

/// Writing a file into the destination tree failed
#[derive(Error, Debug)]
pub enum PlacementError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy {from} into {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move completed copy into {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No free file name left for {path}")]
    SuffixesExhausted { path: PathBuf },
}

/// Errors from the inventory store
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Inventory {path} is corrupt at line {line}: {reason}. Restore it from a backup before running again.")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Inventory {path} stopped accepting records after a failed write. Check free space, then run again.")]
    Unwritable { path: PathBuf },

    #[error("Refusing to commit a second record for fingerprint {fingerprint}")]
    DuplicateCommit { fingerprint: String },

    #[error("Inventory I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Inventory database error: {0}")]
    Database(String),

    #[error("Inventory lock was poisoned by a panicking worker")]
    Poisoned,
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_error_includes_path() {
        let error = ScanError::SourceNotFound {
            path: PathBuf::from("/media/card"),
        };
        assert!(error.to_string().contains("/media/card"));
    }

    #[test]
    fn corrupt_inventory_points_at_line_and_suggests_recovery() {
        let error = InventoryError::Corrupt {
            path: PathBuf::from("/archive/.media-inventory.jsonl"),
            line: 17,
            reason: "expected value".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("line 17"));
        assert!(message.contains("Restore it from a backup"));
    }

    #[test]
    fn inventory_error_converts_into_archive_error() {
        let error: ArchiveError = InventoryError::Poisoned.into();
        assert!(matches!(error, ArchiveError::Inventory(_)));
    }
}
