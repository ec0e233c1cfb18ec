//! Accumulates outbound values, acknowledgements and conflicts into one unit.

use sync_types::{KeyedConflict, SharedValue, SyncEnvelope, UserValue, VarKey, WireValue};

/// Builds up one outbound [`SyncEnvelope`].
///
/// Everything added between two [`take`](EnvelopeBuilder::take) calls
/// coalesces into exactly one transmission; a sweep that added nothing
/// yields `None` so an empty unit is never sent.
#[derive(Default)]
pub struct EnvelopeBuilder {
    envelope: SyncEnvelope,
}

impl EnvelopeBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a shared-variable entry.
    pub fn add_shared_value<T: WireValue>(&mut self, value: SharedValue<T>) {
        T::shared_values_mut(&mut self.envelope).push(value);
    }

    /// Queue a per-participant entry.
    pub fn add_user_value<T: WireValue>(&mut self, value: UserValue<T>) {
        T::user_values_mut(&mut self.envelope).push(value);
    }

    /// Queue an acknowledgement for a shared key of type T.
    pub fn add_shared_ack<T: WireValue>(&mut self, key: VarKey) {
        T::shared_acks_mut(&mut self.envelope).push(key);
    }

    /// Queue an acknowledgement for a per-participant key of type T.
    pub fn add_user_ack<T: WireValue>(&mut self, key: VarKey) {
        T::user_acks_mut(&mut self.envelope).push(key);
    }

    /// Queue a shared-variable conflict.
    pub fn add_shared_conflict<T: WireValue>(&mut self, conflict: KeyedConflict<T>) {
        T::shared_conflicts_mut(&mut self.envelope).push(conflict);
    }

    /// Queue a per-participant conflict.
    pub fn add_user_conflict<T: WireValue>(&mut self, conflict: KeyedConflict<T>) {
        T::user_conflicts_mut(&mut self.envelope).push(conflict);
    }

    /// True when nothing has been queued since the last take.
    pub fn is_empty(&self) -> bool {
        self.envelope.is_empty()
    }

    /// Flush the accumulated unit, leaving the builder empty.
    ///
    /// Returns `None` when nothing was queued; callers must not transmit
    /// in that case.
    pub fn take(&mut self) -> Option<SyncEnvelope> {
        if self.envelope.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.envelope))
    }
}
