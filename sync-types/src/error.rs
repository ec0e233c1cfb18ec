//! Error types for varsync.

use thiserror::Error;

use crate::{ParticipantId, VarKey};

/// Errors that can occur in varsync operations.
///
/// Version conflicts are deliberately absent: a losing write is an expected
/// outcome of concurrent writers and is delivered as data to the writer's
/// conflict observer, not raised as an error.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A variable was registered under a key already present in that partition.
    #[error("duplicate key in registry: {key}")]
    DuplicateKey {
        /// The key that was already registered.
        key: VarKey,
    },

    /// A per-participant slot was read for a participant never observed.
    #[error("unknown presence: {participant}")]
    UnknownPresence {
        /// The participant with no slot.
        participant: ParticipantId,
    },

    /// A joining participant's key-set disagrees with the host's registry.
    #[error("handshake key-set mismatch ({missing} missing, {unexpected} unexpected)")]
    HandshakeMismatch {
        /// Keys the host has that the joiner did not advertise.
        missing: usize,
        /// Keys the joiner advertised that the host does not have.
        unexpected: usize,
    },

    /// MessagePack serialization failed.
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed.
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),
}
