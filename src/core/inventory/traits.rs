//! Inventory backend trait definition.

use super::{InventoryRecord, InventoryStats};
use crate::core::fingerprint::Fingerprint;
use crate::error::InventoryError;
use std::path::Path;

/// Trait for inventory backends
///
/// Implementations load their full state on open, before any file is
/// processed, and must make `commit` exclusive: between concurrent commits of
/// the same fingerprint exactly one succeeds.
pub trait InventoryBackend: Send + Sync {
    /// Find the record for a fingerprint
    fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<InventoryRecord>, InventoryError>;

    /// Durably add a new record.
    ///
    /// Fails with [`InventoryError::DuplicateCommit`] if the fingerprint is
    /// already recorded. The record is visible to `lookup` only once it is
    /// on stable storage.
    fn commit(&self, record: InventoryRecord) -> Result<(), InventoryError>;

    /// Number of records
    fn len(&self) -> Result<usize, InventoryError>;

    fn is_empty(&self) -> Result<bool, InventoryError> {
        Ok(self.len()? == 0)
    }

    /// All records, in commit order where the backend knows it
    fn records(&self) -> Result<Vec<InventoryRecord>, InventoryError>;

    /// Get inventory statistics
    fn stats(&self) -> Result<InventoryStats, InventoryError> {
        Ok(InventoryStats::from_records(&self.records()?))
    }

    /// Backing file, if any
    fn location(&self) -> Option<&Path> {
        None
    }
}
