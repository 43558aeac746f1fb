//! Versioned envelope codec for the storage column.
//!
//! The stored text is a self-describing envelope: object name, schema
//! version, and a field map. Scalars pass through, sets encode as sorted
//! arrays, nested objects recurse as envelopes. Decode tolerates unknown
//! fields (forward tolerance for rolling upgrades) and fills fields
//! introduced by a later minor with their defaults.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::core::cell::{NUMA_CELL_SCHEMA, NumaCell};
use crate::core::identity::InstanceId;
use crate::core::legacy::{self, LegacyError};
use crate::core::schema::{ObjectSchema, SchemaVersion};
use crate::core::topology::{NUMA_TOPOLOGY_SCHEMA, NumaTopology};

/// Self-describing, version-tagged primitive encoding of one object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub object: String,
    pub version: SchemaVersion,
    pub fields: Map<String, Value>,
}

/// Envelope encode/decode failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WireError {
    #[error("payload is not a versioned envelope")]
    NotAnEnvelope,

    #[error("expected `{expected}` envelope, found `{found}`")]
    WrongObjectType { expected: &'static str, found: String },

    #[error("{object} version {written} is not readable by this {supported} reader")]
    IncompatibleVersion {
        object: &'static str,
        written: SchemaVersion,
        supported: SchemaVersion,
    },

    #[error("{object} envelope is missing required field `{field}`")]
    MissingField { object: &'static str, field: &'static str },

    #[error("{object} field `{field}` is not {expected}")]
    FieldType {
        object: &'static str,
        field: &'static str,
        expected: &'static str,
    },

    #[error(transparent)]
    Legacy(#[from] LegacyError),

    #[error("payload is in the legacy format but legacy reads are disabled")]
    LegacyDisabled,

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Check the envelope's tag line against a schema: object name must match,
/// major version must be readable.
fn check_header(envelope: &Envelope, schema: &ObjectSchema) -> Result<(), WireError> {
    if envelope.object != schema.name {
        return Err(WireError::WrongObjectType {
            expected: schema.name,
            found: envelope.object.clone(),
        });
    }
    if !schema.version.can_read(envelope.version) {
        return Err(WireError::IncompatibleVersion {
            object: schema.name,
            written: envelope.version,
            supported: schema.version,
        });
    }
    Ok(())
}

/// Look up a field, treating JSON null like absence. Absence is allowed when
/// the schema says the field may be omitted at the written version.
fn lookup<'a>(
    envelope: &'a Envelope,
    schema: &ObjectSchema,
    field: &'static str,
) -> Result<Option<&'a Value>, WireError> {
    match envelope.fields.get(field) {
        // A name the schema does not declare is never omissible.
        Some(Value::Null) | None => match schema.field(field) {
            Some(def) if schema.may_omit(def, envelope.version) => Ok(None),
            _ => Err(WireError::MissingField {
                object: schema.name,
                field,
            }),
        },
        Some(value) => Ok(Some(value)),
    }
}

/// Like [`lookup`] for fields every readable version requires.
fn required<'a>(
    envelope: &'a Envelope,
    schema: &ObjectSchema,
    field: &'static str,
) -> Result<&'a Value, WireError> {
    lookup(envelope, schema, field)?.ok_or(WireError::MissingField {
        object: schema.name,
        field,
    })
}

fn as_u64(value: &Value, object: &'static str, field: &'static str) -> Result<u64, WireError> {
    value.as_u64().ok_or(WireError::FieldType {
        object,
        field,
        expected: "a non-negative integer",
    })
}

fn as_u32(value: &Value, object: &'static str, field: &'static str) -> Result<u32, WireError> {
    u32::try_from(as_u64(value, object, field)?).map_err(|_| WireError::FieldType {
        object,
        field,
        expected: "a 32-bit integer",
    })
}

impl NumaCell {
    /// Encode into a `NumaCell` envelope. The cpuset is emitted sorted for a
    /// deterministic encoding; it decodes back into a set.
    pub fn to_envelope(&self) -> Envelope {
        let mut fields = Map::new();
        fields.insert("id".to_string(), json!(self.id()));
        fields.insert(
            "cpuset".to_string(),
            Value::Array(self.cpuset().iter().map(|cpu| json!(cpu)).collect()),
        );
        fields.insert("memory".to_string(), json!(self.memory()));
        fields.insert("pagesize".to_string(), json!(self.pagesize()));
        Envelope {
            object: NUMA_CELL_SCHEMA.name.to_string(),
            version: NUMA_CELL_SCHEMA.version,
            fields,
        }
    }

    /// Decode from an envelope. Unknown fields are ignored; `pagesize` is
    /// absent in 1.0 envelopes and defaults to `None`. The result carries no
    /// pending changes.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, WireError> {
        let schema = &NUMA_CELL_SCHEMA;
        check_header(envelope, schema)?;

        let id = as_u32(required(envelope, schema, "id")?, schema.name, "id")?;
        let cpuset = match required(envelope, schema, "cpuset")? {
            Value::Array(values) => {
                let mut set = BTreeSet::new();
                for value in values {
                    set.insert(as_u32(value, schema.name, "cpuset")?);
                }
                set
            }
            _ => {
                return Err(WireError::FieldType {
                    object: schema.name,
                    field: "cpuset",
                    expected: "an array of integers",
                });
            }
        };
        let memory = as_u64(required(envelope, schema, "memory")?, schema.name, "memory")?;
        let pagesize = match lookup(envelope, schema, "pagesize")? {
            Some(value) => Some(as_u32(value, schema.name, "pagesize")?),
            None => None,
        };

        Ok(NumaCell::decoded(id, cpuset, memory, pagesize))
    }
}

impl NumaTopology {
    /// Encode into a `NumaTopology` envelope with nested cell envelopes in
    /// cell order.
    pub fn to_envelope(&self) -> Envelope {
        let mut fields = Map::new();
        fields.insert("instance_uuid".to_string(), json!(self.instance_id()));
        fields.insert(
            "cells".to_string(),
            Value::Array(
                self.cells()
                    .iter()
                    .map(|cell| serde_json::to_value(cell.to_envelope()).expect("envelope is json"))
                    .collect(),
            ),
        );
        fields.insert("legacy_id".to_string(), json!(self.legacy_id()));
        Envelope {
            object: NUMA_TOPOLOGY_SCHEMA.name.to_string(),
            version: NUMA_TOPOLOGY_SCHEMA.version,
            fields,
        }
    }

    /// Decode from an envelope. The result carries no pending changes.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, WireError> {
        let schema = &NUMA_TOPOLOGY_SCHEMA;
        check_header(envelope, schema)?;

        let instance_id = serde_json::from_value::<InstanceId>(
            required(envelope, schema, "instance_uuid")?.clone(),
        )
        .map_err(|_| WireError::FieldType {
            object: schema.name,
            field: "instance_uuid",
            expected: "a UUID string",
        })?;
        let cells = match required(envelope, schema, "cells")? {
            Value::Array(values) => {
                let mut cells = Vec::with_capacity(values.len());
                for value in values {
                    let nested: Envelope = serde_json::from_value(value.clone())
                        .map_err(|_| WireError::NotAnEnvelope)?;
                    cells.push(NumaCell::from_envelope(&nested)?);
                }
                cells
            }
            _ => {
                return Err(WireError::FieldType {
                    object: schema.name,
                    field: "cells",
                    expected: "an array of envelopes",
                });
            }
        };
        let legacy_id = match lookup(envelope, schema, "legacy_id")? {
            Some(value) => Some(value.as_i64().ok_or(WireError::FieldType {
                object: schema.name,
                field: "legacy_id",
                expected: "an integer",
            })?),
            None => None,
        };

        Ok(NumaTopology::decoded(instance_id, cells, legacy_id))
    }

    /// Flat text encoding for the storage column.
    pub fn to_storage_text(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(&self.to_envelope())?)
    }

    /// Decode storage-column text in either encoding.
    ///
    /// A top-level JSON object carrying the `type` marker is the current
    /// envelope; anything else falls through to the legacy decoder with the
    /// caller-supplied `instance_id` (the legacy form never stored one).
    pub fn from_storage_text(instance_id: InstanceId, text: &str) -> Result<Self, WireError> {
        Self::from_storage_text_with(instance_id, text, true)
    }

    /// [`from_storage_text`](Self::from_storage_text) with the legacy branch
    /// switchable, for operators who have verified no legacy rows remain.
    pub fn from_storage_text_with(
        instance_id: InstanceId,
        text: &str,
        allow_legacy: bool,
    ) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(text)?;
        if value.get("type").is_some() {
            let envelope: Envelope =
                serde_json::from_value(value).map_err(|_| WireError::NotAnEnvelope)?;
            Self::from_envelope(&envelope)
        } else if allow_legacy {
            tracing::debug!(instance_id = %instance_id, "decoding legacy-format numa topology");
            Ok(legacy::topology_from_legacy(instance_id, &value)?)
        } else {
            Err(WireError::LegacyDisabled)
        }
    }
}
