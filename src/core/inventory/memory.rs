//! In-memory inventory backend for testing.

use super::{InventoryBackend, InventoryRecord};
use crate::core::fingerprint::Fingerprint;
use crate::error::InventoryError;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory inventory backend
///
/// Nothing survives the process. Useful for tests and one-off runs.
#[derive(Default)]
pub struct InMemoryInventory {
    records: RwLock<HashMap<Fingerprint, InventoryRecord>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InventoryBackend for InMemoryInventory {
    fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<InventoryRecord>, InventoryError> {
        let records = self.records.read().map_err(|_| InventoryError::Poisoned)?;
        Ok(records.get(fingerprint).cloned())
    }

    fn commit(&self, record: InventoryRecord) -> Result<(), InventoryError> {
        let mut records = self.records.write().map_err(|_| InventoryError::Poisoned)?;

        if records.contains_key(&record.fingerprint) {
            return Err(InventoryError::DuplicateCommit {
                fingerprint: record.fingerprint.to_string(),
            });
        }
        records.insert(record.fingerprint, record);
        Ok(())
    }

    fn len(&self) -> Result<usize, InventoryError> {
        let records = self.records.read().map_err(|_| InventoryError::Poisoned)?;
        Ok(records.len())
    }

    fn records(&self) -> Result<Vec<InventoryRecord>, InventoryError> {
        let records = self.records.read().map_err(|_| InventoryError::Poisoned)?;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by_key(|r| r.recorded_at);
        Ok(all)
    }
}
