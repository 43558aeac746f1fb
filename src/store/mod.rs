//! Persistence: storage boundary, dispatch, and the façade operations.

pub mod backend;
pub mod dispatch;
pub mod facade;

pub use backend::{
    MemoryBackend, NUMA_TOPOLOGY_COLUMN, StorageBackend, StorageError, StorageRow, StorageValues,
};
pub use dispatch::{
    DispatchContext, DispatchError, DispatchOptions, LocalExecutor, RemoteCall, RemoteExecutor,
    RemoteFault, RemoteReply, StorageAccess,
};
pub use facade::StoreError;
