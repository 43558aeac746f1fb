//! Core object model.
//!
//! Module hierarchy follows type dependency order:
//! - identity: InstanceId
//! - tracker: ChangeSet
//! - schema: SchemaVersion, FieldDef, ObjectSchema
//! - domain: virt-layer collaborator shapes
//! - cell / topology: the persisted objects
//! - wire: versioned envelope codec
//! - legacy: pre-versioning decoder

pub mod cell;
pub mod domain;
pub mod error;
pub mod identity;
pub mod legacy;
pub mod schema;
pub mod topology;
pub mod tracker;
pub mod wire;

pub use cell::{NUMA_CELL_SCHEMA, NumaCell};
pub use domain::{VirtNumaCell, VirtNumaTopology};
pub use error::{CoreError, InvalidCpuSpec, InvalidDomainConversion, InvalidId};
pub use identity::InstanceId;
pub use legacy::{LegacyError, format_cpu_spec, parse_cpu_spec, topology_from_legacy};
pub use schema::{FieldDef, FieldKind, InvalidVersion, ObjectSchema, SchemaVersion};
pub use topology::{NUMA_TOPOLOGY_SCHEMA, NumaTopology};
pub use tracker::ChangeSet;
pub use wire::{Envelope, WireError};
