//! Local-vs-remote operation dispatch.
//!
//! The object model is shared between a storage-privileged service and
//! storage-unprivileged peers. Both call the same façade operations; the
//! difference is the `DispatchContext` they build. No ambient global decides
//! placement: the context is an explicit per-call value and the routing
//! decision is made fresh on every call.
//!
//! Relay protocol: a serde `RemoteCall` out, a `RemoteReply` back. Domain
//! failures cross the relay as a `RemoteFault` and rehydrate into the same
//! errors the local path produces. Cancellation and timeouts belong to the
//! transport; this layer never retries.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{InstanceId, NumaTopology};
use crate::error::{Effect, Transience};
use crate::store::backend::StorageBackend;
use crate::store::facade::StoreError;

/// Relay failure (the transport broke, not the operation).
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum DispatchError {
    #[error("remote dispatch failed: {reason}")]
    Transport { reason: String },

    #[error("remote peer sent an unexpected reply to {call}")]
    UnexpectedReply { call: &'static str },
}

impl DispatchError {
    pub fn transience(&self) -> Transience {
        match self {
            DispatchError::Transport { .. } => Transience::Retryable,
            DispatchError::UnexpectedReply { .. } => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        // The peer may have executed the operation before the relay broke.
        Effect::Unknown
    }
}

/// One façade operation, serialized for relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RemoteCall {
    GetByInstanceId {
        instance_id: InstanceId,
        /// The caller's decode policy travels with the call, so both
        /// placements enforce the same policy on the same row.
        #[serde(default)]
        options: DispatchOptions,
    },
    /// `topology` is the envelope text of the object to persist.
    Save {
        instance_id: InstanceId,
        topology: String,
    },
    DeleteByInstanceId {
        instance_id: InstanceId,
    },
}

impl RemoteCall {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCall::GetByInstanceId { .. } => "get_by_instance_id",
            RemoteCall::Save { .. } => "save",
            RemoteCall::DeleteByInstanceId { .. } => "delete_by_instance_id",
        }
    }
}

/// Peer answer to a [`RemoteCall`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum RemoteReply {
    /// `topology` is envelope text, or `None` for "no topology recorded".
    Topology { topology: Option<String> },
    Saved,
    Deleted,
    Fault { fault: RemoteFault },
}

/// Domain failure in transit. Mirrors [`StoreError`] minus the relay-only
/// variants, so errors survive the round trip without losing identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum RemoteFault {
    NotFound { instance_id: InstanceId },
    SchemaVersion { instance_id: InstanceId, reason: String },
    Malformed { instance_id: InstanceId, reason: String },
    Storage { reason: String },
}

impl RemoteFault {
    /// Capture a store error for relay. Dispatch errors are not faults: a
    /// peer that cannot reach storage itself reports transport failure.
    pub fn from_store_error(err: &StoreError) -> Option<Self> {
        match err {
            StoreError::NotFound { instance_id } => Some(RemoteFault::NotFound {
                instance_id: *instance_id,
            }),
            StoreError::SchemaVersion {
                instance_id,
                reason,
            } => Some(RemoteFault::SchemaVersion {
                instance_id: *instance_id,
                reason: reason.clone(),
            }),
            StoreError::Malformed {
                instance_id,
                reason,
            } => Some(RemoteFault::Malformed {
                instance_id: *instance_id,
                reason: reason.clone(),
            }),
            StoreError::Storage(err) => Some(RemoteFault::Storage {
                reason: err.reason.clone(),
            }),
            StoreError::Dispatch(_) => None,
        }
    }

    pub fn into_store_error(self) -> StoreError {
        match self {
            RemoteFault::NotFound { instance_id } => StoreError::NotFound { instance_id },
            RemoteFault::SchemaVersion {
                instance_id,
                reason,
            } => StoreError::SchemaVersion {
                instance_id,
                reason,
            },
            RemoteFault::Malformed {
                instance_id,
                reason,
            } => StoreError::Malformed {
                instance_id,
                reason,
            },
            RemoteFault::Storage { reason } => {
                StoreError::Storage(crate::store::backend::StorageError::new(reason))
            }
        }
    }
}

/// Transport collaborator: carries a call to a storage-privileged peer and
/// returns its reply. Implementations own retries, timeouts, cancellation.
pub trait RemoteExecutor {
    fn execute(&self, call: RemoteCall) -> Result<RemoteReply, DispatchError>;
}

/// What the caller can reach: storage directly, or a peer that can.
pub enum StorageAccess<'a> {
    Direct(&'a mut dyn StorageBackend),
    Remote(&'a dyn RemoteExecutor),
}

/// Explicit per-call dispatch context.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchOptions {
    /// Refuse legacy-format rows. Off by default; an operator flips this only
    /// after verifying no legacy rows remain.
    pub reject_legacy_reads: bool,
}

/// Per-call context: storage capability plus decode options.
pub struct DispatchContext<'a> {
    access: StorageAccess<'a>,
    options: DispatchOptions,
}

impl<'a> DispatchContext<'a> {
    pub fn direct(backend: &'a mut dyn StorageBackend) -> Self {
        Self {
            access: StorageAccess::Direct(backend),
            options: DispatchOptions::default(),
        }
    }

    pub fn remote(client: &'a dyn RemoteExecutor) -> Self {
        Self {
            access: StorageAccess::Remote(client),
            options: DispatchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn has_direct_storage_access(&self) -> bool {
        matches!(self.access, StorageAccess::Direct(_))
    }

    pub fn options(&self) -> DispatchOptions {
        self.options
    }

    pub(crate) fn access_mut(&mut self) -> &mut StorageAccess<'a> {
        &mut self.access
    }
}

/// Adapts a backend into a [`RemoteExecutor`] by running the same façade
/// code path the local side runs, so both placements observe identical
/// semantics. This is the peer-side half of the relay; a real deployment
/// wires a transport in front of it.
pub struct LocalExecutor<B> {
    backend: Mutex<B>,
    options: DispatchOptions,
}

impl<B: StorageBackend> LocalExecutor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Mutex::new(backend),
            options: DispatchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Inspect the wrapped backend (test support).
    pub fn backend_mut(&self) -> std::sync::MutexGuard<'_, B> {
        self.backend.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run(&self, call: RemoteCall) -> Result<RemoteReply, StoreError> {
        let mut backend = self.backend_mut();
        match call {
            RemoteCall::GetByInstanceId {
                instance_id,
                options,
            } => {
                // Either side may tighten the legacy policy, neither may
                // loosen the other's.
                let options = DispatchOptions {
                    reject_legacy_reads: self.options.reject_legacy_reads
                        || options.reject_legacy_reads,
                };
                let mut ctx = DispatchContext::direct(&mut *backend).with_options(options);
                let topology = NumaTopology::get_by_instance_id(&mut ctx, instance_id)?;
                let topology = match topology {
                    Some(topology) => Some(topology.to_storage_text().map_err(|err| {
                        StoreError::Malformed {
                            instance_id,
                            reason: err.to_string(),
                        }
                    })?),
                    None => None,
                };
                Ok(RemoteReply::Topology { topology })
            }
            RemoteCall::Save {
                instance_id,
                topology,
            } => {
                let mut topology = NumaTopology::from_storage_text(instance_id, &topology)
                    .map_err(|err| StoreError::Malformed {
                        instance_id,
                        reason: err.to_string(),
                    })?;
                let mut ctx = DispatchContext::direct(&mut *backend).with_options(self.options);
                topology.save(&mut ctx)?;
                Ok(RemoteReply::Saved)
            }
            RemoteCall::DeleteByInstanceId { instance_id } => {
                let mut ctx = DispatchContext::direct(&mut *backend).with_options(self.options);
                NumaTopology::delete_by_instance_id(&mut ctx, instance_id)?;
                Ok(RemoteReply::Deleted)
            }
        }
    }
}

impl<B: StorageBackend> RemoteExecutor for LocalExecutor<B> {
    fn execute(&self, call: RemoteCall) -> Result<RemoteReply, DispatchError> {
        let name = call.name();
        match self.run(call) {
            Ok(reply) => Ok(reply),
            Err(err) => match RemoteFault::from_store_error(&err) {
                Some(fault) => Ok(RemoteReply::Fault { fault }),
                None => Err(DispatchError::Transport {
                    reason: format!("{name}: {err}"),
                }),
            },
        }
    }
}
