#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod store;
pub mod telemetry;

pub use config::{Config, LoggingConfig};
pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    ChangeSet, CoreError, Envelope, InstanceId, NUMA_CELL_SCHEMA, NUMA_TOPOLOGY_SCHEMA, NumaCell,
    NumaTopology, ObjectSchema, SchemaVersion, VirtNumaCell, VirtNumaTopology, WireError,
    format_cpu_spec, parse_cpu_spec,
};
pub use crate::store::{
    DispatchContext, DispatchError, DispatchOptions, LocalExecutor, MemoryBackend,
    NUMA_TOPOLOGY_COLUMN, RemoteCall, RemoteExecutor, RemoteFault, RemoteReply, StorageAccess,
    StorageBackend, StorageError, StorageRow, StorageValues, StoreError,
};
