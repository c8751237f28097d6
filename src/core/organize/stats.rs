//! Lock-free run counters shared across workers.

use super::types::{FileOutcome, RunStatistics};
use crate::core::metadata::DateOrigin;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

/// Atomic counters behind [`RunStatistics`]
#[derive(Default)]
pub struct StatsRecorder {
    scanned: AtomicUsize,
    originals: AtomicUsize,
    duplicates: AtomicUsize,
    quarantined: AtomicUsize,
    already_archived: AtomicUsize,
    fingerprint_collisions: AtomicUsize,
    skipped_non_media: AtomicUsize,
    scan_errors: AtomicUsize,
    no_embedded_date: AtomicUsize,
    placement_retries: AtomicUsize,
    bytes_copied: AtomicU64,
    processed: AtomicUsize,
    last_percent: AtomicU8,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scan_totals(&self, scanned: usize, skipped_non_media: usize, scan_errors: usize) {
        self.scanned.store(scanned, Ordering::SeqCst);
        self.skipped_non_media.store(skipped_non_media, Ordering::SeqCst);
        self.scan_errors.store(scan_errors, Ordering::SeqCst);
    }

    pub fn record_retry(&self) {
        self.placement_retries.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_bytes(&self, bytes: u64) {
        self.bytes_copied.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn record_date_origin(&self, origin: DateOrigin) {
        if !origin.is_embedded() {
            self.no_embedded_date.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Count a finished file.
    ///
    /// Returns the new whole percentage when this file crossed into it, so
    /// each percent is reported exactly once however many workers finish together.
    pub fn record_outcome(&self, outcome: &FileOutcome) -> Option<u8> {
        let counter = match outcome {
            FileOutcome::Original { .. } => &self.originals,
            FileOutcome::Collision { .. } => {
                self.fingerprint_collisions.fetch_add(1, Ordering::SeqCst);
                &self.originals
            }
            FileOutcome::Duplicate { .. } => &self.duplicates,
            FileOutcome::Quarantined { .. } => &self.quarantined,
            FileOutcome::AlreadyArchived { .. } | FileOutcome::Recovered { .. } => {
                &self.already_archived
            }
        };
        counter.fetch_add(1, Ordering::SeqCst);

        let done = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.scanned.load(Ordering::SeqCst).max(1);
        let percent = ((done * 100) / total).min(100) as u8;
        let previous = self.last_percent.fetch_max(percent, Ordering::SeqCst);
        (percent > previous).then_some(percent)
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self, duration_ms: u64) -> RunStatistics {
        RunStatistics {
            scanned: self.scanned.load(Ordering::SeqCst),
            originals: self.originals.load(Ordering::SeqCst),
            duplicates: self.duplicates.load(Ordering::SeqCst),
            quarantined: self.quarantined.load(Ordering::SeqCst),
            already_archived: self.already_archived.load(Ordering::SeqCst),
            fingerprint_collisions: self.fingerprint_collisions.load(Ordering::SeqCst),
            skipped_non_media: self.skipped_non_media.load(Ordering::SeqCst),
            scan_errors: self.scan_errors.load(Ordering::SeqCst),
            no_embedded_date: self.no_embedded_date.load(Ordering::SeqCst),
            placement_retries: self.placement_retries.load(Ordering::SeqCst),
            bytes_copied: self.bytes_copied.load(Ordering::SeqCst),
            duration_ms,
            percent: self.last_percent.load(Ordering::SeqCst),
        }
    }
}
