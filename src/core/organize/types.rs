//! Types for the organize module.

use crate::core::metadata::{CaptureDate, PlausibleWindow};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// What to do with a file whose content is already archived
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateAction {
    /// Copy into `_duplicates/YYYY/MM/`
    #[default]
    Copy,
    /// Count it, leave it where it is
    Skip,
}

/// Configuration for an archive run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Tree to read from. Never written to.
    pub source: PathBuf,
    /// Archive root
    pub destination: PathBuf,
    /// Quarantine bucket; `DEST/_quarantine` when unset
    pub quarantine: Option<PathBuf>,
    pub duplicate_action: DuplicateAction,
    /// Compare full content before trusting a fingerprint match
    pub verify_duplicates: bool,
    /// Worker threads; rayon's default when unset
    pub workers: Option<usize>,
    pub include_hidden: bool,
    /// Replace the built-in media extension list
    pub extensions: Option<Vec<String>>,
    /// Capture dates before January 1st of this year are implausible
    pub min_year: i32,
    /// Classify and route everything, write nothing (not even the inventory)
    pub dry_run: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            quarantine: None,
            duplicate_action: DuplicateAction::Copy,
            verify_duplicates: true,
            workers: None,
            include_hidden: false,
            extensions: None,
            min_year: PlausibleWindow::DEFAULT_MIN_YEAR,
            dry_run: false,
        }
    }
}

/// Terminal state of one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileOutcome {
    /// First occurrence; copied and recorded
    Original { destination: PathBuf, date: CaptureDate },
    /// Content already archived. `destination` is `None` when duplicates are
    /// skipped, and may be shared with an identical same-named file of this run.
    Duplicate {
        destination: Option<PathBuf>,
        original: PathBuf,
        date: CaptureDate,
    },
    /// Same fingerprint as an archived file but different bytes; placed as an
    /// original without a record
    Collision {
        destination: PathBuf,
        canonical: PathBuf,
        date: CaptureDate,
    },
    /// Undatable or unreadable. `destination` is `None` if even the quarantine copy failed.
    Quarantined {
        destination: Option<PathBuf>,
        reason: String,
    },
    /// Found already placed by an earlier run; nothing written
    AlreadyArchived { destination: PathBuf },
    /// Found in its original slot without a record; record added, nothing written
    Recovered { destination: PathBuf, date: CaptureDate },
}

impl FileOutcome {
    /// Where the file ended up, if anywhere
    pub fn destination(&self) -> Option<&PathBuf> {
        match self {
            FileOutcome::Original { destination, .. }
            | FileOutcome::Collision { destination, .. }
            | FileOutcome::AlreadyArchived { destination }
            | FileOutcome::Recovered { destination, .. } => Some(destination),
            FileOutcome::Duplicate { destination, .. }
            | FileOutcome::Quarantined { destination, .. } => destination.as_ref(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileOutcome::Original { .. } => "original",
            FileOutcome::Duplicate { .. } => "duplicate",
            FileOutcome::Collision { .. } => "collision",
            FileOutcome::Quarantined { .. } => "quarantined",
            FileOutcome::AlreadyArchived { .. } => "already-archived",
            FileOutcome::Recovered { .. } => "recovered",
        }
    }
}

/// Cumulative counters for one run. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Media files discovered
    pub scanned: usize,
    pub originals: usize,
    pub duplicates: usize,
    pub quarantined: usize,
    /// Already in the archive from an earlier run (including recovered ones)
    pub already_archived: usize,
    /// Fingerprint matches whose bytes differed; also counted in `originals`
    pub fingerprint_collisions: usize,
    pub skipped_non_media: usize,
    pub scan_errors: usize,
    /// Dated from the filesystem because no embedded date was usable
    pub no_embedded_date: usize,
    pub placement_retries: usize,
    pub bytes_copied: u64,
    pub duration_ms: u64,
    /// Share of scanned files finished, 0-100
    pub percent: u8,
}

impl RunStatistics {
    /// Files that reached a terminal state
    pub fn processed(&self) -> usize {
        self.originals + self.duplicates + self.quarantined + self.already_archived
    }
}

/// One line of the run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub source: PathBuf,
    pub outcome: FileOutcome,
}

/// Result of an archive run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Nothing was written; destinations are where files would have gone
    pub dry_run: bool,
    pub stats: RunStatistics,
    /// Per-file outcomes, sorted by source path
    pub files: Vec<FileReport>,
    /// Subtrees or entries that could not be enumerated
    pub scan_errors: Vec<String>,
}

impl RunReport {
    /// Outcome for a source path, if it was processed
    pub fn outcome_for(&self, source: &std::path::Path) -> Option<&FileOutcome> {
        self.files
            .iter()
            .find(|f| f.source == source)
            .map(|f| &f.outcome)
    }
}
