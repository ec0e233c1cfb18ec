//! Protocol messages for varsync.
//!
//! A [`SyncMessage`] is the top-level frame handed to and received from the
//! match transport. Envelopes carry ordinary replication traffic; handshakes
//! run once per joining participant.

use serde::{Deserialize, Serialize};

use crate::{SyncEnvelope, SyncError, VarKey};

/// All protocol messages.
///
/// Encoded as MessagePack with named fields so that skipped empty envelope
/// buckets survive the round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncMessage {
    /// A joining participant advertises its complete key-space.
    Handshake(HandshakeRequest),
    /// The host's verdict on a handshake.
    HandshakeReply(HandshakeReply),
    /// One unit of replication traffic.
    Envelope(SyncEnvelope),
}

impl SyncMessage {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        rmp_serde::to_vec_named(self).map_err(SyncError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        rmp_serde::from_slice(bytes).map_err(SyncError::Deserialization)
    }
}

/// The complete key-set a joining participant advertises before engaging in
/// synchronization traffic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HandshakeRequest {
    /// Keys registered in the shared partition.
    pub shared_keys: Vec<VarKey>,
    /// Keys registered in the per-participant partition.
    pub user_keys: Vec<VarKey>,
}

/// The host's response to a [`HandshakeRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeReply {
    /// Whether the key-sets matched.
    pub accepted: bool,
    /// On acceptance, a snapshot of the host's current state so the joiner
    /// converges immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SyncEnvelope>,
}
