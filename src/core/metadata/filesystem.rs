//! Last-resort date: filesystem modification time, else creation time.

use super::{DateOrigin, DateSource};
use crate::core::scanner::SourceFile;
use crate::error::MetadataError;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::SystemTime;

pub struct FilesystemDateSource;

impl DateSource for FilesystemDateSource {
    fn origin(&self) -> DateOrigin {
        DateOrigin::FilesystemFallback
    }

    fn capture_time(&self, file: &SourceFile) -> Result<NaiveDateTime, MetadataError> {
        self.candidate_times(file)?
            .into_iter()
            .next()
            .ok_or(MetadataError::MissingTag {
                tag: "filesystem timestamp",
            })
    }

    /// Modification time (from the scan when known), then creation time
    fn candidate_times(&self, file: &SourceFile) -> Result<Vec<NaiveDateTime>, MetadataError> {
        let metadata = std::fs::metadata(&file.path);
        let modified = file
            .modified
            .or_else(|| metadata.as_ref().ok().and_then(|m| m.modified().ok()));
        let created = metadata.as_ref().ok().and_then(|m| m.created().ok());

        let times: Vec<NaiveDateTime> = modified
            .into_iter()
            .chain(created)
            .map(to_naive_utc)
            .collect();
        if times.is_empty() {
            return Err(match metadata {
                Err(e) => MetadataError::Io(e),
                Ok(_) => MetadataError::MissingTag {
                    tag: "filesystem timestamp",
                },
            });
        }
        Ok(times)
    }
}

fn to_naive_utc(time: SystemTime) -> NaiveDateTime {
    DateTime::<Utc>::from(time).naive_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::MediaKind;
    use chrono::{Datelike, NaiveDate};
    use std::fs::File;
    use std::path::PathBuf;

    #[test]
    fn uses_scanned_mtime_without_touching_disk() {
        let mtime: SystemTime = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc()
            .into();
        let file = SourceFile {
            path: PathBuf::from("/nonexistent/b.jpg"),
            size: 1,
            modified: Some(mtime),
            kind: MediaKind::Photo,
        };

        let datetime = FilesystemDateSource.capture_time(&file).unwrap();
        assert_eq!((datetime.year(), datetime.month()), (2020, 1));
    }

    #[test]
    fn reads_metadata_when_scan_had_no_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.png");
        let handle = File::create(&path).unwrap();
        let mtime: SystemTime = NaiveDate::from_ymd_opt(2015, 6, 9)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
            .and_utc()
            .into();
        handle.set_modified(mtime).unwrap();

        let file = SourceFile {
            path,
            size: 0,
            modified: None,
            kind: MediaKind::Photo,
        };
        let datetime = FilesystemDateSource.capture_time(&file).unwrap();
        assert_eq!((datetime.year(), datetime.month()), (2015, 6));
    }

    #[test]
    fn creation_time_follows_an_implausible_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.mov");
        File::create(&path).unwrap();
        let zeroed: SystemTime = NaiveDate::from_ymd_opt(1904, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .into();
        let file = SourceFile {
            path: path.clone(),
            size: 0,
            modified: Some(zeroed),
            kind: MediaKind::Video,
        };

        let times = FilesystemDateSource.candidate_times(&file).unwrap();

        assert_eq!(times[0].year(), 1904);
        // Not every filesystem records a birth time
        if let Ok(created) = std::fs::metadata(&path).and_then(|m| m.created()) {
            assert_eq!(times, vec![times[0], to_naive_utc(created)]);
        }
    }

    #[test]
    fn missing_file_without_mtime_is_io_error() {
        let file = SourceFile {
            path: PathBuf::from("/nonexistent/b.jpg"),
            size: 1,
            modified: None,
            kind: MediaKind::Photo,
        };
        assert!(matches!(
            FilesystemDateSource.capture_time(&file),
            Err(MetadataError::Io(_))
        ));
    }
}
