//! The persisted aggregate: an instance's NUMA topology.
//!
//! Version 1.0: initial version
//! Version 1.1: takes into account pagesize

use crate::core::cell::NumaCell;
use crate::core::domain::{VirtNumaCell, VirtNumaTopology};
use crate::core::error::{CoreError, InvalidDomainConversion};
use crate::core::identity::InstanceId;
use crate::core::schema::{FieldDef, FieldKind, ObjectSchema, SchemaVersion};
use crate::core::tracker::ChangeSet;

/// Schema for [`NumaTopology`].
pub const NUMA_TOPOLOGY_SCHEMA: ObjectSchema = ObjectSchema {
    name: "NumaTopology",
    version: SchemaVersion::new(1, 1),
    fields: &[
        FieldDef {
            name: "instance_uuid",
            kind: FieldKind::Uuid,
            nullable: false,
            read_only: true,
            since_minor: 0,
        },
        FieldDef {
            name: "cells",
            kind: FieldKind::ObjectList,
            nullable: false,
            read_only: false,
            since_minor: 0,
        },
        // Deprecated: kept in the schema for compatibility with rows written
        // by old writers. Never interpreted.
        FieldDef {
            name: "legacy_id",
            kind: FieldKind::Integer,
            nullable: true,
            read_only: false,
            since_minor: 0,
        },
    ],
};

const SETTABLE_FIELDS: &[&str] = &["cells", "legacy_id"];

/// Versioned, persisted NUMA topology for one compute instance.
///
/// `instance_id` is the storage key and has no setter. Cell order is
/// significant (cell index = position) and survives every encode/decode
/// cycle. The object owns its cells outright.
#[derive(Clone, Debug)]
pub struct NumaTopology {
    instance_id: InstanceId,
    cells: Vec<NumaCell>,
    legacy_id: Option<i64>,
    changes: ChangeSet,
}

impl NumaTopology {
    /// Build a new, not-yet-persisted topology.
    pub fn new(instance_id: InstanceId, cells: Vec<NumaCell>) -> Self {
        Self {
            instance_id,
            cells,
            legacy_id: None,
            changes: ChangeSet::all_of(SETTABLE_FIELDS),
        }
    }

    /// Build a topology whose values already match stored data.
    pub(crate) fn decoded(
        instance_id: InstanceId,
        cells: Vec<NumaCell>,
        legacy_id: Option<i64>,
    ) -> Self {
        Self {
            instance_id,
            cells,
            legacy_id,
            changes: ChangeSet::clean(),
        }
    }

    /// Translate a domain-model topology into the persisted shape, copying
    /// cell values. An empty domain topology cannot be persisted.
    pub fn from_domain(instance_id: InstanceId, topology: &VirtNumaTopology) -> Result<Self, CoreError> {
        if topology.is_empty() {
            return Err(InvalidDomainConversion {
                reason: "domain topology has no cells".to_string(),
            }
            .into());
        }
        let cells = topology
            .cells
            .iter()
            .map(|cell| NumaCell::new(cell.id, cell.cpuset.clone(), cell.memory, cell.pagesize))
            .collect();
        Ok(Self::new(instance_id, cells))
    }

    /// Extract a domain-model topology, copying cell values back out.
    pub fn to_domain(&self) -> VirtNumaTopology {
        let cells = self
            .cells
            .iter()
            .map(|cell| {
                VirtNumaCell::new(cell.id(), cell.cpuset().clone(), cell.memory(), cell.pagesize())
            })
            .collect();
        VirtNumaTopology::new(cells)
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn cells(&self) -> &[NumaCell] {
        &self.cells
    }

    pub fn legacy_id(&self) -> Option<i64> {
        self.legacy_id
    }

    pub fn set_cells(&mut self, cells: Vec<NumaCell>) {
        self.cells = cells;
        self.changes.mark("cells");
    }

    pub fn set_legacy_id(&mut self, legacy_id: Option<i64>) {
        self.legacy_id = legacy_id;
        self.changes.mark("legacy_id");
    }

    pub fn changed_fields(&self) -> &ChangeSet {
        &self.changes
    }

    /// Clear pending changes. Called after a successful save and after a
    /// legacy decode, where the in-memory value already equals storage.
    pub fn reset_changes(&mut self) {
        self.changes.reset();
        for cell in &mut self.cells {
            cell.reset_changes();
        }
    }
}

impl PartialEq for NumaTopology {
    fn eq(&self, other: &Self) -> bool {
        self.instance_id == other.instance_id
            && self.cells == other.cells
            && self.legacy_id == other.legacy_id
    }
}

impl Eq for NumaTopology {}
