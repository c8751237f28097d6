//! # Router Module
//!
//! Decides where a file belongs. Pure path computation; nothing is written here.
//!
//! ## Layout
//! - `DEST/YYYY/MM/name` - first occurrence of a fingerprint
//! - `DEST/_duplicates/YYYY/MM/name` - later occurrences, dated by their own capture date
//! - `DEST/_quarantine/name` - no date could be resolved, or the file could not be read
//!
//! When a slot is taken by a different file, names are tried in a fixed
//! order: `name.ext`, `name_001.ext`, `name_002.ext`, ...

use crate::core::inventory::InventoryRecord;
use crate::core::metadata::{CaptureDate, DateResolution};
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Bucket for later occurrences of a fingerprint
pub const DUPLICATES_DIR: &str = "_duplicates";
/// Bucket for undatable and unreadable files
pub const QUARANTINE_DIR: &str = "_quarantine";
/// Highest collision suffix tried before giving up
pub const MAX_SUFFIX: u32 = 9999;

/// What a file is, relative to the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Original,
    Duplicate,
    Quarantined,
}

/// Where a file should go. The final name is settled at placement time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub classification: Classification,
    pub directory: PathBuf,
    /// Source basename, kept byte-for-byte (not necessarily UTF-8)
    pub file_name: OsString,
}

impl Route {
    /// Candidate destination paths, preferred first
    pub fn candidates(&self) -> impl Iterator<Item = PathBuf> + '_ {
        candidate_names(&self.file_name).map(move |name| self.directory.join(name))
    }

    /// The unsuffixed destination path
    pub fn preferred(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// `name.ext`, then `name_001.ext` through `name_9999.ext`
pub fn candidate_names(file_name: &OsStr) -> impl Iterator<Item = OsString> + '_ {
    let path = Path::new(file_name);
    let stem = path.file_stem().unwrap_or(file_name);
    let extension = path.extension();

    std::iter::once(file_name.to_os_string()).chain((1..=MAX_SUFFIX).map(move |n| {
        let mut name = stem.to_os_string();
        name.push(format!("_{n:03}"));
        if let Some(ext) = extension {
            name.push(".");
            name.push(ext);
        }
        name
    }))
}

/// Maps a (date, inventory hit) pair onto the destination layout
#[derive(Debug, Clone)]
pub struct Router {
    root: PathBuf,
    quarantine: PathBuf,
}

impl Router {
    /// Router for a destination root, with the quarantine bucket inside it
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let quarantine = root.join(QUARANTINE_DIR);
        Self { root, quarantine }
    }

    /// Put quarantined files somewhere other than `DEST/_quarantine`
    pub fn with_quarantine(mut self, quarantine: impl Into<PathBuf>) -> Self {
        self.quarantine = quarantine.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn quarantine_dir(&self) -> &Path {
        &self.quarantine
    }

    pub fn original_dir(&self, date: &CaptureDate) -> PathBuf {
        self.root.join(date.year_dir()).join(date.month_dir())
    }

    pub fn duplicate_dir(&self, date: &CaptureDate) -> PathBuf {
        self.root
            .join(DUPLICATES_DIR)
            .join(date.year_dir())
            .join(date.month_dir())
    }

    /// Classify a file and compute its destination directory.
    ///
    /// `seen` is the inventory record for the file's fingerprint, if any.
    /// An unresolved date wins over everything: such a file is quarantined
    /// whether or not its content was seen before.
    pub fn route(
        &self,
        file_name: impl AsRef<OsStr>,
        resolution: &DateResolution,
        seen: Option<&InventoryRecord>,
    ) -> Route {
        let (classification, directory) = match (resolution.date(), seen) {
            (None, _) => (Classification::Quarantined, self.quarantine.clone()),
            (Some(date), None) => (Classification::Original, self.original_dir(&date)),
            (Some(date), Some(_)) => (Classification::Duplicate, self.duplicate_dir(&date)),
        };

        Route {
            classification,
            directory,
            file_name: file_name.as_ref().to_os_string(),
        }
    }

    /// Route for a file that never got as far as date resolution
    pub fn quarantine(&self, file_name: impl AsRef<OsStr>) -> Route {
        Route {
            classification: Classification::Quarantined,
            directory: self.quarantine.clone(),
            file_name: file_name.as_ref().to_os_string(),
        }
    }

    /// Route a fingerprint collision: an original slot under its own date
    pub fn original(&self, file_name: impl AsRef<OsStr>, date: &CaptureDate) -> Route {
        Route {
            classification: Classification::Original,
            directory: self.original_dir(date),
            file_name: file_name.as_ref().to_os_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fingerprint::Fingerprint;
    use crate::core::inventory::RecordOutcome;
    use crate::core::metadata::DateOrigin;
    use chrono::Utc;
    use uuid::Uuid;

    fn resolved(year: i32, month: u32) -> DateResolution {
        DateResolution::Resolved(CaptureDate::new(year, month, DateOrigin::Exif))
    }

    fn seen() -> InventoryRecord {
        InventoryRecord {
            fingerprint: Fingerprint { crc32: 1, size: 1 },
            date: CaptureDate::new(2012, 7, DateOrigin::Exif),
            destination: PathBuf::from("/archive/2012/07/a.jpg"),
            source: PathBuf::from("/card/a.jpg"),
            outcome: RecordOutcome::Placed,
            recorded_at: Utc::now(),
            run_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn unseen_fingerprint_is_original_under_year_month() {
        let router = Router::new("/archive");
        let route = router.route("a.jpg", &resolved(2012, 7), None);

        assert_eq!(route.classification, Classification::Original);
        assert_eq!(route.preferred(), PathBuf::from("/archive/2012/07/a.jpg"));
    }

    #[test]
    fn seen_fingerprint_is_duplicate_under_its_own_date() {
        let router = Router::new("/archive");
        let route = router.route("b.jpg", &resolved(2020, 1), Some(&seen()));

        assert_eq!(route.classification, Classification::Duplicate);
        assert_eq!(
            route.preferred(),
            PathBuf::from("/archive/_duplicates/2020/01/b.jpg")
        );
    }

    #[test]
    fn unresolved_date_is_quarantined_even_if_seen() {
        let router = Router::new("/archive");
        let unresolved = DateResolution::Unresolved { failures: vec![] };

        for hit in [None, Some(seen())] {
            let route = router.route("c.mp4", &unresolved, hit.as_ref());
            assert_eq!(route.classification, Classification::Quarantined);
            assert_eq!(route.preferred(), PathBuf::from("/archive/_quarantine/c.mp4"));
        }
    }

    #[test]
    fn quarantine_location_can_be_moved() {
        let router = Router::new("/archive").with_quarantine("/triage");
        assert_eq!(
            router.quarantine("c.mp4").preferred(),
            PathBuf::from("/triage/c.mp4")
        );
    }

    #[test]
    fn candidates_are_suffixed_deterministically() {
        let names: Vec<_> = candidate_names(OsStr::new("IMG_0001.JPG")).take(3).collect();
        assert_eq!(names, vec!["IMG_0001.JPG", "IMG_0001_001.JPG", "IMG_0001_002.JPG"]);

        let bare: Vec<_> = candidate_names(OsStr::new("README")).take(2).collect();
        assert_eq!(bare, vec!["README", "README_001"]);
    }

    #[test]
    fn candidates_are_bounded() {
        let name = OsStr::new("a.jpg");
        assert_eq!(candidate_names(name).count(), MAX_SUFFIX as usize + 1);
        assert_eq!(candidate_names(name).last().unwrap(), "a_9999.jpg");
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_keep_their_bytes_and_extension() {
        use std::os::unix::ffi::{OsStrExt, OsStringExt};

        let name = OsStr::from_bytes(b"f\xe9rias.jpg");
        let names: Vec<Vec<u8>> = candidate_names(name)
            .take(2)
            .map(OsStringExt::into_vec)
            .collect();

        assert_eq!(names[0], b"f\xe9rias.jpg".to_vec());
        assert_eq!(names[1], b"f\xe9rias_001.jpg".to_vec());
        assert_eq!(
            Router::new("/archive").quarantine(name).preferred(),
            Path::new("/archive/_quarantine").join(name)
        );
    }
}
