//! Static field schemas and version tags.
//!
//! Each persisted object declares an `ObjectSchema`: an ordered list of field
//! definitions plus a `major.minor` version. A minor bump only ever adds
//! nullable/optional fields; a major bump may remove or reinterpret fields.
//! Readers accept any minor at their own major and fill late-minor fields
//! with their declared default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `major.minor` schema version tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u16,
    pub minor: u16,
}

impl SchemaVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Whether this reader version can decode an envelope tagged `written`.
    ///
    /// Same major, any minor: older minors decode with defaults filled in,
    /// newer minors decode with unknown fields ignored. A different major is
    /// a breaking change and is rejected.
    pub fn can_read(&self, written: SchemaVersion) -> bool {
        self.major == written.major
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Malformed `major.minor` version string.
#[derive(Debug, Error, Clone)]
#[error("schema version `{raw}` is invalid: {reason}")]
pub struct InvalidVersion {
    pub raw: String,
    pub reason: String,
}

impl FromStr for SchemaVersion {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| InvalidVersion {
            raw: s.to_string(),
            reason: reason.to_string(),
        };
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| invalid("expected `major.minor`"))?;
        let major = major
            .parse::<u16>()
            .map_err(|_| invalid("major is not a number"))?;
        let minor = minor
            .parse::<u16>()
            .map_err(|_| invalid("minor is not a number"))?;
        Ok(SchemaVersion { major, minor })
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Primitive shape of a schema field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    /// Unordered set of non-negative integers; encodes as a sorted array.
    IntegerSet,
    Uuid,
    /// Ordered sequence of nested object envelopes.
    ObjectList,
}

/// One named field of an object schema.
#[derive(Clone, Copy, Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    pub read_only: bool,
    /// Minor version that introduced the field. Envelopes written before it
    /// legitimately omit the field; the default (null/absent) applies.
    pub since_minor: u16,
}

/// Fixed, ordered schema of a persisted object type.
#[derive(Clone, Copy, Debug)]
pub struct ObjectSchema {
    pub name: &'static str,
    pub version: SchemaVersion,
    pub fields: &'static [FieldDef],
}

impl ObjectSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether `field` may be absent from an envelope written at `written`.
    pub fn may_omit(&self, field: &FieldDef, written: SchemaVersion) -> bool {
        field.nullable || written.minor < field.since_minor
    }
}
