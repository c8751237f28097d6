//! # Organize Module
//!
//! Drives a run: every media file under the source root ends in exactly one
//! of original, duplicate, quarantine or already-archived.
//!
//! ## Per-file states
//! `Discovered -> Fingerprinted -> DateResolved -> Classified -> Placed -> Recorded`,
//! with `Quarantined` reachable from fingerprinting (unreadable), date
//! resolution (no plausible date) and placement (failed twice).
//!
//! ## Parallelism
//! Fingerprinting and date resolution run on a rayon pool. Placement then
//! groups files by fingerprint; each group is handled by one worker in
//! capture-date order, so a fingerprint is committed at most once per run.

mod executor;
mod placement;
mod stats;
mod types;

pub use executor::{Archiver, ArchiverBuilder};
pub use placement::{files_identical, place, preview, Placement};
pub use stats::StatsRecorder;
pub use types::*;
