//! Transport abstraction for match traffic.
//!
//! The engine never opens a socket itself; the embedding application hands
//! it a [`MatchTransport`] and the engine decides only *what* to send and
//! *to whom*. Two delivery shapes exist:
//! - `broadcast()` fans a frame out to every participant in the match
//! - `send_to()` delivers a frame to exactly one participant (handshake
//!   replies and version conflicts are never broadcast)

mod mock;

pub use mock::{MockTransport, SentFrame};

use async_trait::async_trait;
use sync_types::ParticipantId;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The target participant could not be reached.
    #[error("participant {0} unreachable")]
    Unreachable(ParticipantId),

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The underlying connection is closed.
    #[error("transport closed")]
    Closed,
}

/// Delivery of already-encoded protocol frames within one match.
///
/// Implementations wrap whatever the application uses for match
/// networking (a relayed socket, a mesh, the in-memory mock for tests).
/// Frame content is opaque bytes; ordering guarantees are per sender,
/// matching what the dispatch logic assumes.
#[async_trait]
pub trait MatchTransport: Send + Sync {
    /// Deliver a frame to a single participant.
    async fn send_to(&self, target: &ParticipantId, data: &[u8]) -> Result<(), TransportError>;

    /// Deliver a frame to every other participant in the match.
    async fn broadcast(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Close the transport gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
