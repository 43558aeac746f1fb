//! One NUMA cell of an instance topology.
//!
//! Version 1.0: initial version
//! Version 1.1: add pagesize field

use std::collections::BTreeSet;

use crate::core::schema::{FieldDef, FieldKind, ObjectSchema, SchemaVersion};
use crate::core::tracker::ChangeSet;

/// Schema for [`NumaCell`].
pub const NUMA_CELL_SCHEMA: ObjectSchema = ObjectSchema {
    name: "NumaCell",
    version: SchemaVersion::new(1, 1),
    fields: &[
        FieldDef {
            name: "id",
            kind: FieldKind::Integer,
            nullable: false,
            read_only: true,
            since_minor: 0,
        },
        FieldDef {
            name: "cpuset",
            kind: FieldKind::IntegerSet,
            nullable: false,
            read_only: false,
            since_minor: 0,
        },
        FieldDef {
            name: "memory",
            kind: FieldKind::Integer,
            nullable: false,
            read_only: false,
            since_minor: 0,
        },
        FieldDef {
            name: "pagesize",
            kind: FieldKind::Integer,
            nullable: true,
            read_only: false,
            since_minor: 1,
        },
    ],
};

const SETTABLE_FIELDS: &[&str] = &["cpuset", "memory", "pagesize"];

/// One NUMA node's contribution to an instance's virtual topology.
///
/// `id` is read-only after construction. Mutation goes through setters so the
/// change set stays accurate; equality ignores change-tracking state.
#[derive(Clone, Debug)]
pub struct NumaCell {
    id: u32,
    cpuset: BTreeSet<u32>,
    /// Megabytes.
    memory: u64,
    /// Page size in KB; `None` means unspecified/default.
    pagesize: Option<u32>,
    changes: ChangeSet,
}

impl NumaCell {
    /// Build a new, not-yet-persisted cell. All settable fields start out
    /// marked as changed.
    pub fn new(id: u32, cpuset: BTreeSet<u32>, memory: u64, pagesize: Option<u32>) -> Self {
        Self {
            id,
            cpuset,
            memory,
            pagesize,
            changes: ChangeSet::all_of(SETTABLE_FIELDS),
        }
    }

    /// Build a cell whose values already match stored data.
    pub(crate) fn decoded(
        id: u32,
        cpuset: BTreeSet<u32>,
        memory: u64,
        pagesize: Option<u32>,
    ) -> Self {
        Self {
            id,
            cpuset,
            memory,
            pagesize,
            changes: ChangeSet::clean(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn cpuset(&self) -> &BTreeSet<u32> {
        &self.cpuset
    }

    pub fn memory(&self) -> u64 {
        self.memory
    }

    pub fn pagesize(&self) -> Option<u32> {
        self.pagesize
    }

    pub fn set_cpuset(&mut self, cpuset: BTreeSet<u32>) {
        self.cpuset = cpuset;
        self.changes.mark("cpuset");
    }

    pub fn set_memory(&mut self, memory: u64) {
        self.memory = memory;
        self.changes.mark("memory");
    }

    pub fn set_pagesize(&mut self, pagesize: Option<u32>) {
        self.pagesize = pagesize;
        self.changes.mark("pagesize");
    }

    pub fn changed_fields(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn reset_changes(&mut self) {
        self.changes.reset();
    }
}

impl PartialEq for NumaCell {
    fn eq(&self, other: &Self) -> bool {
        // Value equality only; pending changes are bookkeeping.
        self.id == other.id
            && self.cpuset == other.cpuset
            && self.memory == other.memory
            && self.pagesize == other.pagesize
    }
}

impl Eq for NumaCell {}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpus(list: &[u32]) -> BTreeSet<u32> {
        list.iter().copied().collect()
    }

    #[test]
    fn new_cell_starts_fully_changed() {
        let cell = NumaCell::new(0, cpus(&[0, 1]), 1024, None);
        assert!(cell.changed_fields().contains("cpuset"));
        assert!(cell.changed_fields().contains("memory"));
        assert!(cell.changed_fields().contains("pagesize"));
        assert!(!cell.changed_fields().contains("id"));
    }

    #[test]
    fn setters_mark_changes_after_reset() {
        let mut cell = NumaCell::new(0, cpus(&[0, 1]), 1024, None);
        cell.reset_changes();
        assert!(cell.changed_fields().is_empty());

        cell.set_memory(2048);
        assert!(cell.changed_fields().contains("memory"));
        assert!(!cell.changed_fields().contains("cpuset"));
    }

    #[test]
    fn equality_ignores_change_state() {
        let mut a = NumaCell::new(1, cpus(&[2, 3]), 2048, Some(4));
        let b = NumaCell::decoded(1, cpus(&[2, 3]), 2048, Some(4));
        assert_eq!(a, b);
        a.reset_changes();
        assert_eq!(a, b);
    }

    #[test]
    fn schema_declares_pagesize_nullable_since_1_1() {
        let field = NUMA_CELL_SCHEMA.field("pagesize").unwrap();
        assert!(field.nullable);
        assert_eq!(field.since_minor, 1);
        assert!(NUMA_CELL_SCHEMA.may_omit(field, SchemaVersion::new(1, 0)));
    }
}
