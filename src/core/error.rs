//! Core capability errors (parsing, validation, domain conversion).
//!
//! These are bounded and stable: core errors represent domain/refusal states,
//! not library implementation details.

use thiserror::Error;

use crate::error::{Effect, Transience};

/// Invalid identifier.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("instance id `{raw}` is invalid: {reason}")]
    Instance { raw: String, reason: String },
}

/// Invalid cpu-spec string in the legacy grammar.
#[derive(Debug, Error, Clone)]
#[error("cpu spec `{raw}` is invalid: {reason}")]
pub struct InvalidCpuSpec {
    pub raw: String,
    pub reason: String,
}

/// Asked to build the persisted object from a domain value that cannot
/// represent a topology.
#[derive(Debug, Error, Clone)]
#[error("cannot build topology from domain value: {reason}")]
pub struct InvalidDomainConversion {
    pub reason: String,
}

/// Canonical error enum for core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    InvalidCpuSpec(#[from] InvalidCpuSpec),
    #[error(transparent)]
    InvalidDomainConversion(#[from] InvalidDomainConversion),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Core errors are pure domain/input failures.
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
