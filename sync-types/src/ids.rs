//! Identity types for varsync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A unique identifier for a participant in a match.
///
/// Assigned by the session layer; UUID v4 format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(uuid::Uuid);

impl ParticipantId {
    /// Create a new random ParticipantId.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Create a ParticipantId from an existing UUID.
    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }

    /// Create a ParticipantId from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        uuid::Uuid::from_slice(bytes).ok().map(Self)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParticipantId({})", self.0)
    }
}

/// The key identifying one synchronized variable within a match's key-space.
///
/// Shared and per-participant keys live in disjoint namespaces; the same
/// string may name a shared variable and a per-participant variable without
/// collision.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarKey(String);

impl VarKey {
    /// Create a new VarKey.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VarKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for VarKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for VarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for VarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VarKey({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_id_is_uuid_v4() {
        let id = ParticipantId::random();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn participant_id_roundtrip() {
        let original = ParticipantId::random();
        let restored = ParticipantId::from_bytes(original.as_uuid().as_bytes()).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn participant_id_from_invalid_length_fails() {
        assert!(ParticipantId::from_bytes(&[0u8; 7]).is_none());
    }

    #[test]
    fn var_key_equality() {
        assert_eq!(VarKey::from("score"), VarKey::new("score"));
        assert_ne!(VarKey::from("score"), VarKey::from("health"));
    }

    #[test]
    fn var_key_serializes_as_plain_string() {
        let key = VarKey::from("score");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"score\"");
    }
}
