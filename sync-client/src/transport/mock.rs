//! Mock transport for testing.
//!
//! Captures every outbound frame with its delivery shape so tests can
//! assert on what was sent where, and replay frames into other match
//! instances to simulate a full mesh.

use super::{MatchTransport, TransportError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use sync_types::ParticipantId;

/// One captured outbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SentFrame {
    /// Sent to every participant.
    Broadcast(Vec<u8>),
    /// Sent to exactly one participant.
    To(ParticipantId, Vec<u8>),
}

/// Mock transport for testing.
///
/// Clones share state, so a test can keep a handle while the match
/// instance owns another.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    frames: Vec<SentFrame>,
    closed: bool,
    fail_next_send: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// All frames sent so far, in order.
    pub fn frames(&self) -> Vec<SentFrame> {
        self.inner.lock().unwrap().frames.clone()
    }

    /// Remove and return all captured frames, in send order.
    pub fn drain(&self) -> Vec<SentFrame> {
        std::mem::take(&mut self.inner.lock().unwrap().frames)
    }

    /// Only the broadcast payloads, in send order.
    pub fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .frames
            .iter()
            .filter_map(|f| match f {
                SentFrame::Broadcast(data) => Some(data.clone()),
                SentFrame::To(..) => None,
            })
            .collect()
    }

    /// Only the payloads targeted at one participant, in send order.
    pub fn sent_to(&self, target: &ParticipantId) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .frames
            .iter()
            .filter_map(|f| match f {
                SentFrame::To(id, data) if id == target => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Cause the next send (targeted or broadcast) to fail.
    pub fn fail_next_send(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_send = Some(error.to_string());
    }

    /// Clear all captured frames and state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl MatchTransport for MockTransport {
    async fn send_to(&self, target: &ParticipantId, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(TransportError::Closed);
        }
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }
        inner.frames.push(SentFrame::To(*target, data.to_vec()));
        Ok(())
    }

    async fn broadcast(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(TransportError::Closed);
        }
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }
        inner.frames.push(SentFrame::Broadcast(data.to_vec()));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.inner.lock().unwrap().closed = true;
        Ok(())
    }
}
