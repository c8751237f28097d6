//! # Core Module
//!
//! The archiving engine, leaves first.
//!
//! ## Modules
//! - `scanner` - Discovers media files in the source tree
//! - `metadata` - Resolves the true capture date of a file
//! - `fingerprint` - Computes a bounded-cost content identity
//! - `inventory` - Persists every fingerprint ever placed
//! - `router` - Classifies files and computes destination paths
//! - `organize` - Orchestrates a run and places files

pub mod fingerprint;
pub mod inventory;
pub mod metadata;
pub mod organize;
pub mod router;
pub mod scanner;

// Re-export commonly used types
pub use fingerprint::Fingerprint;
pub use inventory::{InventoryBackend, InventoryRecord};
pub use metadata::{CaptureDate, DateOrigin};
pub use organize::{Archiver, FileOutcome, RunReport, RunStatistics};
pub use router::Classification;
pub use scanner::SourceFile;
