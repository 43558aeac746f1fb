//! Persistence façade: get / save / delete by instance id.
//!
//! Thin operations that tie the codec, the legacy decoder, and the change
//! tracker to the storage column, routed through the dispatch context. All
//! three calls are synchronous; their only suspension points are the storage
//! call itself or, remotely placed, the relay round trip.

use thiserror::Error;
use tracing::debug;

use crate::core::wire::WireError;
use crate::core::{InstanceId, NumaTopology};
use crate::error::{Effect, Transience};
use crate::store::backend::{
    NUMA_TOPOLOGY_COLUMN, StorageBackend, StorageError, StorageValues,
};
use crate::store::dispatch::{
    DispatchContext, DispatchError, RemoteCall, RemoteReply, StorageAccess,
};

/// Persistence failures. Decode errors always name the offending instance.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("instance {instance_id} has no topology record")]
    NotFound { instance_id: InstanceId },

    #[error("stored topology for instance {instance_id} is at an unsupported version: {reason}")]
    SchemaVersion {
        instance_id: InstanceId,
        reason: String,
    },

    #[error("stored topology for instance {instance_id} is malformed: {reason}")]
    Malformed {
        instance_id: InstanceId,
        reason: String,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl StoreError {
    /// Attach the instance id to a decode failure, keeping the version
    /// rejection distinct from plain corruption.
    fn from_wire(instance_id: InstanceId, err: WireError) -> Self {
        match err {
            WireError::IncompatibleVersion { .. } => StoreError::SchemaVersion {
                instance_id,
                reason: err.to_string(),
            },
            other => StoreError::Malformed {
                instance_id,
                reason: other.to_string(),
            },
        }
    }

    pub fn transience(&self) -> Transience {
        match self {
            StoreError::NotFound { .. }
            | StoreError::SchemaVersion { .. }
            | StoreError::Malformed { .. } => Transience::Permanent,
            StoreError::Storage(err) => err.transience(),
            StoreError::Dispatch(err) => err.transience(),
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            StoreError::NotFound { .. }
            | StoreError::SchemaVersion { .. }
            | StoreError::Malformed { .. } => Effect::None,
            StoreError::Storage(err) => err.effect(),
            StoreError::Dispatch(err) => err.effect(),
        }
    }
}

fn get_local(
    backend: &mut dyn StorageBackend,
    instance_id: InstanceId,
    allow_legacy: bool,
) -> Result<Option<NumaTopology>, StoreError> {
    let row = backend
        .get(&instance_id, &[NUMA_TOPOLOGY_COLUMN])?
        .ok_or(StoreError::NotFound { instance_id })?;
    match row.get(NUMA_TOPOLOGY_COLUMN).cloned().flatten() {
        // Null column: topology explicitly cleared. A valid result, not an
        // error.
        None => Ok(None),
        Some(text) => NumaTopology::from_storage_text_with(instance_id, &text, allow_legacy)
            .map(Some)
            .map_err(|err| StoreError::from_wire(instance_id, err)),
    }
}

fn save_local(
    backend: &mut dyn StorageBackend,
    topology: &NumaTopology,
) -> Result<(), StoreError> {
    let instance_id = topology.instance_id();
    let text = topology
        .to_storage_text()
        .map_err(|err| StoreError::from_wire(instance_id, err))?;
    let mut values = StorageValues::new();
    values.insert(NUMA_TOPOLOGY_COLUMN.to_string(), Some(text));
    backend.update(&instance_id, values)?;
    Ok(())
}

fn delete_local(
    backend: &mut dyn StorageBackend,
    instance_id: InstanceId,
) -> Result<(), StoreError> {
    let mut values = StorageValues::new();
    values.insert(NUMA_TOPOLOGY_COLUMN.to_string(), None);
    backend.update(&instance_id, values)?;
    Ok(())
}

fn expect_topology(reply: RemoteReply, call: &'static str) -> Result<Option<String>, StoreError> {
    match reply {
        RemoteReply::Topology { topology } => Ok(topology),
        RemoteReply::Fault { fault } => Err(fault.into_store_error()),
        _ => Err(DispatchError::UnexpectedReply { call }.into()),
    }
}

fn expect_ack(reply: RemoteReply, call: &'static str) -> Result<(), StoreError> {
    match reply {
        RemoteReply::Saved | RemoteReply::Deleted => Ok(()),
        RemoteReply::Fault { fault } => Err(fault.into_store_error()),
        _ => Err(DispatchError::UnexpectedReply { call }.into()),
    }
}

impl NumaTopology {
    /// Read the stored topology for `instance_id`.
    ///
    /// Absent row fails with [`StoreError::NotFound`]; a null column returns
    /// `Ok(None)` ("no topology recorded"); otherwise the column decodes
    /// through the envelope codec or, transparently, the legacy decoder.
    pub fn get_by_instance_id(
        ctx: &mut DispatchContext<'_>,
        instance_id: InstanceId,
    ) -> Result<Option<Self>, StoreError> {
        let options = ctx.options();
        let allow_legacy = !options.reject_legacy_reads;
        match ctx.access_mut() {
            StorageAccess::Direct(backend) => {
                debug!(instance_id = %instance_id, "get numa topology");
                get_local(&mut **backend, instance_id, allow_legacy)
            }
            StorageAccess::Remote(client) => {
                // The policy rides along; the peer decodes under it.
                let reply = client.execute(RemoteCall::GetByInstanceId {
                    instance_id,
                    options,
                })?;
                match expect_topology(reply, "get_by_instance_id")? {
                    // The peer answers with envelope text; decode locally so
                    // both placements hand back the same object.
                    Some(text) => NumaTopology::from_storage_text_with(
                        instance_id,
                        &text,
                        allow_legacy,
                    )
                    .map(Some)
                    .map_err(|err| StoreError::from_wire(instance_id, err)),
                    None => Ok(None),
                }
            }
        }
    }

    /// Encode and write this topology to its instance's row, then clear the
    /// change set. The write is a single-column update: the full encoded
    /// value lands or nothing does.
    pub fn save(&mut self, ctx: &mut DispatchContext<'_>) -> Result<(), StoreError> {
        let instance_id = self.instance_id();
        match ctx.access_mut() {
            StorageAccess::Direct(backend) => {
                debug!(instance_id = %instance_id, changed = !self.changed_fields().is_empty(), "save numa topology");
                save_local(&mut **backend, self)?;
            }
            StorageAccess::Remote(client) => {
                let topology = self
                    .to_storage_text()
                    .map_err(|err| StoreError::from_wire(instance_id, err))?;
                let reply = client.execute(RemoteCall::Save {
                    instance_id,
                    topology,
                })?;
                expect_ack(reply, "save")?;
            }
        }
        self.reset_changes();
        Ok(())
    }

    /// Clear the stored topology for `instance_id` by nulling the column.
    /// Idempotent: already-null and absent rows are fine.
    pub fn delete_by_instance_id(
        ctx: &mut DispatchContext<'_>,
        instance_id: InstanceId,
    ) -> Result<(), StoreError> {
        match ctx.access_mut() {
            StorageAccess::Direct(backend) => {
                debug!(instance_id = %instance_id, "delete numa topology");
                delete_local(&mut **backend, instance_id)
            }
            StorageAccess::Remote(client) => {
                let reply = client.execute(RemoteCall::DeleteByInstanceId { instance_id })?;
                expect_ack(reply, "delete_by_instance_id")
            }
        }
    }
}
