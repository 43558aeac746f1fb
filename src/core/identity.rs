//! Identity atoms.
//!
//! InstanceId: the compute instance a topology belongs to. It doubles as the
//! storage key, so it is immutable for the object's lifetime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{CoreError, InvalidId};

/// Compute-instance identifier (UUID).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse and validate an instance ID string.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Uuid::from_str(s).map(Self).map_err(|e| {
            InvalidId::Instance {
                raw: s.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Generate a fresh random instance ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid() {
        let id = InstanceId::parse("9f2a7c1e-0d5b-4d8a-93f1-5a7e2c4b6d80").unwrap();
        assert_eq!(id.to_string(), "9f2a7c1e-0d5b-4d8a-93f1-5a7e2c4b6d80");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(InstanceId::parse("not-a-uuid").is_err());
        assert!(InstanceId::parse("").is_err());
    }

    #[test]
    fn serde_transparent() {
        let id = InstanceId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let back: InstanceId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
