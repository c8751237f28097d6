//! Event type definitions for progress reporting.

use crate::core::organize::{FileOutcome, RunStatistics};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted during an archiving run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Source tree enumeration
    Scan(ScanEvent),
    /// Per-file processing
    Organize(OrganizeEvent),
    /// Run-level events
    Run(RunEvent),
}

/// Events during enumeration of the source tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// Enumeration has started
    Started { root: PathBuf },
    /// A subtree could not be read; traversal continues
    Error { path: PathBuf, message: String },
    /// Enumeration completed
    Completed {
        total_files: usize,
        skipped_non_media: usize,
    },
}

/// Events while files are fingerprinted, classified and placed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrganizeEvent {
    /// Processing has started
    Started { total_files: usize },
    /// A file reached a terminal state
    FileDone { source: PathBuf, outcome: FileOutcome },
    /// Emitted once per whole percent of discovered files
    Progress {
        percent: u8,
        processed: usize,
        total: usize,
        stats: RunStatistics,
    },
    /// Processing completed
    Completed { stats: RunStatistics },
}

/// Run-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    /// Run has started
    Started,
    /// Moving to a new phase
    PhaseChanged { phase: RunPhase },
    /// A fatal setup error stopped the run
    Error { message: String },
}

/// Phases of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Scanning,
    Analyzing,
    Placing,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Scanning => write!(f, "Scanning"),
            RunPhase::Analyzing => write!(f, "Analyzing"),
            RunPhase::Placing => write!(f, "Placing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Scan(ScanEvent::Completed {
            total_files: 10,
            skipped_non_media: 3,
        });

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Scan(ScanEvent::Completed {
                skipped_non_media, ..
            }) => assert_eq!(skipped_non_media, 3),
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn phase_displays_name() {
        assert_eq!(RunPhase::Placing.to_string(), "Placing");
    }
}
