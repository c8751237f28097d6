//! # Inventory Module
//!
//! Durable record of every fingerprint ever placed in the archive.
//!
//! A record is written exactly once per fingerprint, after the file it
//! describes is fully on disk, and is never changed afterwards. A file that
//! was copied but never recorded (crash in between) is simply seen again on
//! the next run; placement then finds the identical file already in its slot.
//!
//! ## Backends
//! - `JsonlLedger` - append-only JSON Lines file (default)
//! - `SqliteInventory` - indexed SQLite database for very large archives
//! - `InMemoryInventory` - for testing

mod ledger;
mod memory;
mod sqlite;
mod traits;

pub use ledger::JsonlLedger;
pub use memory::InMemoryInventory;
pub use sqlite::SqliteInventory;
pub use traits::InventoryBackend;

use crate::core::fingerprint::Fingerprint;
use crate::core::metadata::CaptureDate;
use crate::error::InventoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Ledger file name used when no inventory path is given
pub const DEFAULT_LEDGER_NAME: &str = ".media-inventory.jsonl";

/// How the canonical copy came to be in the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    /// Copied by this engine
    Placed,
    /// Found already in its slot (an earlier run copied it but never recorded it)
    Recovered,
}

impl RecordOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Placed => "placed",
            RecordOutcome::Recovered => "recovered",
        }
    }

}

impl FromStr for RecordOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "placed" => Ok(RecordOutcome::Placed),
            "recovered" => Ok(RecordOutcome::Recovered),
            other => Err(format!("unknown outcome {other:?}")),
        }
    }
}

/// One persisted line of truth. Keyed by fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub fingerprint: Fingerprint,
    pub date: CaptureDate,
    /// Canonical copy inside the destination tree
    #[serde(with = "os_path")]
    pub destination: PathBuf,
    /// Where the file was first seen, for audit
    #[serde(with = "os_path")]
    pub source: PathBuf,
    pub outcome: RecordOutcome,
    pub recorded_at: DateTime<Utc>,
    pub run_id: Uuid,
}

/// Summary of an inventory's contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStats {
    pub total_records: usize,
    pub placed: usize,
    pub recovered: usize,
    /// Distinct runs that committed at least one record
    pub runs: usize,
    pub oldest_record: Option<DateTime<Utc>>,
    pub newest_record: Option<DateTime<Utc>>,
}

impl InventoryStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a InventoryRecord>) -> Self {
        let mut stats = InventoryStats::default();
        let mut runs = std::collections::HashSet::new();

        for record in records {
            stats.total_records += 1;
            match record.outcome {
                RecordOutcome::Placed => stats.placed += 1,
                RecordOutcome::Recovered => stats.recovered += 1,
            }
            runs.insert(record.run_id);
            stats.oldest_record = Some(match stats.oldest_record {
                Some(t) => t.min(record.recorded_at),
                None => record.recorded_at,
            });
            stats.newest_record = Some(match stats.newest_record {
                Some(t) => t.max(record.recorded_at),
                None => record.recorded_at,
            });
        }

        stats.runs = runs.len();
        stats
    }
}

/// Whether `path` names an SQLite inventory rather than a JSONL ledger
pub fn is_sqlite_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_lowercase().as_str(), "db" | "sqlite" | "sqlite3"))
        .unwrap_or(false)
}

/// Open (or create) a persistent inventory, picking the backend from the extension
pub fn open_inventory(path: &Path) -> Result<Box<dyn InventoryBackend>, InventoryError> {
    if is_sqlite_path(path) {
        Ok(Box::new(SqliteInventory::open(path)?))
    } else {
        Ok(Box::new(JsonlLedger::open(path)?))
    }
}

/// Raw bytes of a path, exactly as the OS has them
#[cfg(unix)]
pub(crate) fn path_to_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
pub(crate) fn path_to_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(unix)]
pub(crate) fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(std::ffi::OsString::from_vec(bytes))
}

#[cfg(not(unix))]
pub(crate) fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
}

/// Paths as JSON strings when they are UTF-8, as byte arrays when not
mod os_path {
    use super::{path_from_bytes, path_to_bytes};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::path::{Path, PathBuf};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Bytes(Vec<u8>),
    }

    pub fn serialize<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
        match path.to_str() {
            Some(text) => serializer.serialize_str(text),
            None => serializer.serialize_bytes(&path_to_bytes(path)),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PathBuf, D::Error> {
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(text) => PathBuf::from(text),
            Repr::Bytes(bytes) => path_from_bytes(bytes),
        })
    }
}

/// Default inventory location for a destination root
pub fn default_inventory_path(destination: &Path) -> PathBuf {
    destination.join(DEFAULT_LEDGER_NAME)
}


#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;

    #[test]
    fn sqlite_is_selected_by_extension() {
        assert!(is_sqlite_path(Path::new("/a/inventory.db")));
        assert!(is_sqlite_path(Path::new("/a/inventory.SQLITE3")));
        assert!(!is_sqlite_path(Path::new("/a/.media-inventory.jsonl")));
        assert!(!is_sqlite_path(Path::new("/a/inventory")));
    }

    #[test]
    fn record_serializes_to_a_single_json_line() {
        let json = serde_json::to_string(&record(0xDEADBEEF, "a.jpg")).unwrap();
        assert!(!json.contains('\n'));
        assert!(json.contains("\"fingerprint\":\"deadbeef-1024\""));
        assert!(json.contains("\"outcome\":\"placed\""));
        assert!(json.contains("\"origin\":\"exif\""));
    }

    #[test]
    fn outcome_tags_parse_back() {
        for outcome in [RecordOutcome::Placed, RecordOutcome::Recovered] {
            assert_eq!(outcome.as_str().parse::<RecordOutcome>(), Ok(outcome));
        }
        assert!("misplaced".parse::<RecordOutcome>().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_survive_a_json_round_trip() {
        use std::os::unix::ffi::OsStrExt;

        let mut entry = record(7, "a.jpg");
        entry.source = Path::new(std::ffi::OsStr::from_bytes(b"/card/f\xe9rias.jpg")).to_path_buf();

        let json = serde_json::to_string(&entry).unwrap();
        let back: InventoryRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(back.source, entry.source);
        assert_eq!(back.destination, entry.destination);
        assert!(json.contains("\"destination\":\"/archive/"));
    }

    #[test]
    fn stats_count_outcomes_and_runs() {
        let a = record(1, "a.jpg");
        let mut b = record(2, "b.jpg");
        b.outcome = RecordOutcome::Recovered;
        b.run_id = a.run_id;
        let c = record(3, "c.jpg");

        let stats = InventoryStats::from_records([&a, &b, &c]);
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.placed, 2);
        assert_eq!(stats.recovered, 1);
        assert_eq!(stats.runs, 2);
        assert!(stats.oldest_record <= stats.newest_record);
    }

    #[test]
    fn open_inventory_creates_the_chosen_backend() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open_inventory(&dir.path().join("inv.jsonl")).unwrap();
        let db = open_inventory(&dir.path().join("inv.db")).unwrap();
        assert_eq!(ledger.len().unwrap(), 0);
        assert_eq!(db.len().unwrap(), 0);
        assert!(dir.path().join("inv.db").exists());
    }
}
