//! # varsync-types
//!
//! Wire format types for the varsync match variable synchronization protocol.
//!
//! This crate provides the foundational types used across all varsync crates:
//! - [`ParticipantId`], [`VarKey`] - identity types
//! - [`SyncEnvelope`] - one unit of replication traffic, with typed buckets
//! - [`SyncMessage`] - top-level protocol frames (handshake, envelope)
//! - [`VersionedWrite`], [`VersionConflict`] - optimistic-concurrency outcomes
//! - [`SyncError`] - error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod ids;
mod messages;
mod values;

pub use envelope::{SyncEnvelope, WireValue};
pub use error::SyncError;
pub use ids::{ParticipantId, VarKey};
pub use messages::{HandshakeReply, HandshakeRequest, SyncMessage};
pub use values::{
    KeyedConflict, SharedValue, UserValue, ValidationStatus, VersionConflict, VersionedWrite,
};
