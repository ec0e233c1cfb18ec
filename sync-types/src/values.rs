//! Value transfer objects for synchronized variables.
//!
//! These are the per-entry payloads carried inside a [`SyncEnvelope`]'s
//! typed buckets.
//!
//! [`SyncEnvelope`]: crate::SyncEnvelope

use serde::{Deserialize, Serialize};

use crate::{ParticipantId, VarKey};

/// Validation state of a synchronized key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Not yet confirmed by the host.
    #[default]
    Unvalidated,
    /// Confirmed by the host.
    Validated,
    /// Rejected by the host in favor of a concurrent write.
    Rejected,
}

/// One shared-variable entry on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedValue<T> {
    /// The variable key.
    pub key: VarKey,
    /// The value being carried.
    pub value: T,
    /// The key's lock version as of this entry.
    pub lock_version: u32,
    /// Validation state as of this entry.
    #[serde(rename = "key_validation_status")]
    pub status: ValidationStatus,
}

/// One per-participant-variable entry on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserValue<T> {
    /// The variable key.
    pub key: VarKey,
    /// The participant whose slot this entry targets.
    pub target: ParticipantId,
    /// The value being carried.
    pub value: T,
    /// The key's lock version as of this entry.
    pub lock_version: u32,
    /// Validation state as of this entry.
    #[serde(rename = "key_validation_status")]
    pub status: ValidationStatus,
}

/// An attempted mutation: value, declared version, authoring participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedWrite<T> {
    /// The value the writer attempted to store.
    pub value: T,
    /// The lock version the writer declared.
    pub version: u32,
    /// The participant that authored the write.
    pub writer: ParticipantId,
}

impl<T> VersionedWrite<T> {
    /// Create a new versioned write.
    pub fn new(value: T, version: u32, writer: ParticipantId) -> Self {
        Self {
            value,
            version,
            writer,
        }
    }
}

/// The outcome delivered to a writer that lost a version race.
///
/// Pairs the rejected write with the write that is actually authoritative
/// for the same key, when one is stored; a rejection against a key with no
/// stored write carries no accepted side. Delivered only to the losing
/// writer, never broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionConflict<T> {
    /// The write that lost the race.
    #[serde(rename = "rejected_write")]
    pub rejected: VersionedWrite<T>,
    /// The write that is currently stored, if any.
    #[serde(
        rename = "accepted_write",
        default = "Option::default",
        skip_serializing_if = "Option::is_none"
    )]
    pub accepted: Option<VersionedWrite<T>>,
}

/// A version conflict tagged with the key it arbitrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedConflict<T> {
    /// The variable key the conflict concerns.
    pub key: VarKey,
    /// The conflict outcome.
    pub conflict: VersionConflict<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_status_defaults_to_unvalidated() {
        assert_eq!(ValidationStatus::default(), ValidationStatus::Unvalidated);
    }

    #[test]
    fn conflict_wire_field_names() {
        let writer = ParticipantId::random();
        let conflict = VersionConflict {
            rejected: VersionedWrite::new(20i64, 1, writer),
            accepted: Some(VersionedWrite::new(10i64, 2, writer)),
        };
        let json = serde_json::to_value(&conflict).unwrap();
        assert!(json.get("rejected_write").is_some());
        assert!(json.get("accepted_write").is_some());
    }

    #[test]
    fn conflict_without_a_stored_write_omits_the_accepted_side() {
        let conflict = VersionConflict {
            rejected: VersionedWrite::new(20i64, 3, ParticipantId::random()),
            accepted: None,
        };
        let json = serde_json::to_value(&conflict).unwrap();
        assert!(json.get("accepted_write").is_none());

        let restored: VersionConflict<i64> =
            serde_json::from_value(json).unwrap();
        assert!(restored.accepted.is_none());
    }

    #[test]
    fn shared_value_status_wire_name() {
        let value = SharedValue {
            key: VarKey::from("score"),
            value: 7i64,
            lock_version: 3,
            status: ValidationStatus::Validated,
        };
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["key_validation_status"], "validated");
    }
}
