//! Domain-model collaborator boundary.
//!
//! The virt layer owns topology construction, validation, and NUMA-cell
//! arithmetic. We only define the shape exchanged at the boundary; conversion
//! into and out of the persisted object copies values, never aliases.

use std::collections::BTreeSet;

/// One NUMA cell as the virt layer models it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtNumaCell {
    pub id: u32,
    pub cpuset: BTreeSet<u32>,
    pub memory: u64,
    pub pagesize: Option<u32>,
}

impl VirtNumaCell {
    pub fn new(id: u32, cpuset: BTreeSet<u32>, memory: u64, pagesize: Option<u32>) -> Self {
        Self {
            id,
            cpuset,
            memory,
            pagesize,
        }
    }
}

/// An instance's virtual NUMA topology as the virt layer models it.
///
/// Cell order is significant: index = cell position. Cpuset disjointness
/// across cells is the virt layer's invariant, not checked here.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct VirtNumaTopology {
    pub cells: Vec<VirtNumaCell>,
}

impl VirtNumaTopology {
    pub fn new(cells: Vec<VirtNumaCell>) -> Self {
        Self { cells }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
