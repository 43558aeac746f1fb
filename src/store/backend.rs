//! Storage collaborator boundary.
//!
//! The topology lives in one nullable text column of a per-instance row.
//! Physical row access belongs to the storage layer; this trait is the whole
//! contract we consume. `MemoryBackend` ships for tests and embedded use.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::InstanceId;
use crate::error::{Effect, Transience};

/// Column holding the encoded topology.
pub const NUMA_TOPOLOGY_COLUMN: &str = "numa_topology";

/// Selected columns of one row: column name to nullable text.
pub type StorageRow = BTreeMap<String, Option<String>>;

/// Column values for an update: column name to nullable text.
pub type StorageValues = BTreeMap<String, Option<String>>;

/// Storage layer failure, opaque to this crate.
#[derive(Debug, Error, Clone)]
#[error("storage backend failure: {reason}")]
pub struct StorageError {
    pub reason: String,
}

impl StorageError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn transience(&self) -> Transience {
        // The backend is opaque; contention and outages look the same here.
        Transience::Unknown
    }

    pub fn effect(&self) -> Effect {
        Effect::Unknown
    }
}

/// Row storage keyed by instance id.
///
/// `update` upserts: writing to an instance that has no row yet creates it.
/// A row with a null topology column and a missing row are distinct states
/// and both observable through `get`.
pub trait StorageBackend {
    /// Read the named columns of the instance's row. `None` means no row.
    fn get(&self, id: &InstanceId, columns: &[&str]) -> Result<Option<StorageRow>, StorageError>;

    /// Upsert column values on the instance's row.
    fn update(&mut self, id: &InstanceId, values: StorageValues) -> Result<(), StorageError>;
}

/// BTreeMap-backed storage for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: BTreeMap<InstanceId, StorageRow>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw row, as migration or test fixtures need.
    pub fn insert_row(&mut self, id: InstanceId, row: StorageRow) {
        self.rows.insert(id, row);
    }

    pub fn row(&self, id: &InstanceId) -> Option<&StorageRow> {
        self.rows.get(id)
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, id: &InstanceId, columns: &[&str]) -> Result<Option<StorageRow>, StorageError> {
        Ok(self.rows.get(id).map(|row| {
            columns
                .iter()
                .map(|&col| (col.to_string(), row.get(col).cloned().flatten()))
                .collect()
        }))
    }

    fn update(&mut self, id: &InstanceId, values: StorageValues) -> Result<(), StorageError> {
        let row = self.rows.entry(*id).or_default();
        for (column, value) in values {
            row.insert(column, value);
        }
        Ok(())
    }
}
