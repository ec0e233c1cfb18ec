//! # varsync-client
//!
//! The I/O shell around `varsync-core`: owns the transport, serializes
//! dispatch per match, and turns what the pure logic accumulates into
//! actual sends.
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use varsync_client::{MockTransport, SyncMatch};
//! use varsync_core::{SharedVar, VarRegistry};
//! use varsync_types::ParticipantId;
//!
//! let registry = Arc::new(VarRegistry::new());
//! let score = Arc::new(SharedVar::<i64>::new());
//! registry.register_shared("score", score.clone())?;
//!
//! let sync = SyncMatch::new(ParticipantId::random(), registry, MockTransport::new());
//! sync.host_changed(None, Some(sync.self_id())).await?;
//! sync.set_shared("score", 10i64).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod match_client;
pub mod transport;

pub use match_client::{ClientError, SyncMatch};
pub use transport::{MatchTransport, MockTransport, SentFrame, TransportError};

// Re-exported so applications can depend on this crate alone.
pub use sync_core::{MigrationOutcome, Role, SharedVar, UserVar, VarRegistry};
pub use sync_types::{ParticipantId, ValidationStatus, VarKey};
