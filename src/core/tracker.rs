//! Explicit change tracking.
//!
//! Every mutable field is modified through a setter that marks the field name
//! here. The set is an observability/minimal-write aid, never a correctness
//! mechanism: a full encode is valid even when the set is empty.

use std::collections::BTreeSet;

/// Names of fields mutated since construction or the last reset.
///
/// Field names are the schema names, so the set lines up with what an
/// envelope would carry.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    changed: BTreeSet<&'static str>,
}

impl ChangeSet {
    /// Empty set: nothing pending. Used after decode of stored data.
    pub fn clean() -> Self {
        Self::default()
    }

    /// Mark every listed field as changed. Used by constructors: a freshly
    /// built object has never been persisted.
    pub fn all_of(fields: &[&'static str]) -> Self {
        Self {
            changed: fields.iter().copied().collect(),
        }
    }

    pub fn mark(&mut self, field: &'static str) {
        self.changed.insert(field);
    }

    pub fn reset(&mut self) {
        self.changed.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.changed.contains(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.changed.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_and_reset() {
        let mut changes = ChangeSet::clean();
        assert!(changes.is_empty());

        changes.mark("memory");
        changes.mark("cpuset");
        changes.mark("memory");
        assert_eq!(changes.fields().collect::<Vec<_>>(), vec!["cpuset", "memory"]);

        changes.reset();
        assert!(changes.is_empty());
    }

    #[test]
    fn all_of_marks_everything() {
        let changes = ChangeSet::all_of(&["cells", "legacy_id"]);
        assert!(changes.contains("cells"));
        assert!(changes.contains("legacy_id"));
        assert!(!changes.contains("instance_uuid"));
    }
}
