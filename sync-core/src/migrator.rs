//! Host migration: reacting to authority hand-off.
//!
//! The previous host may have left mid-validation, so a new host re-asserts
//! freshness of every key with an acknowledgement sweep before accepting
//! further writes. The caller must run this to completion before processing
//! any further inbound unit for the same match.

use sync_types::ParticipantId;

use crate::builder::EnvelopeBuilder;
use crate::registry::{VarRegistry, VarValue};

/// What an authority-change notification meant for the local process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// We were promoted: the builder now holds an acknowledgement sweep the
    /// caller must flush as exactly one outbound unit.
    BecameHost,
    /// We were demoted; nothing to send.
    LostHost,
    /// Authority moved between other participants; nothing to do.
    Unrelated,
}

/// React to an authority change delivered as an (old host, new host) pair.
///
/// Becoming host sweeps one acknowledgement per key across all eight
/// partition slices into `builder`, then flips `is_host` on every store as
/// a set. Losing host only clears the flags; a demoted host has nothing
/// authoritative left to assert.
pub fn handle_host_changed(
    registry: &VarRegistry,
    builder: &mut EnvelopeBuilder,
    self_id: ParticipantId,
    old_host: Option<ParticipantId>,
    new_host: Option<ParticipantId>,
) -> MigrationOutcome {
    if new_host == Some(self_id) {
        // No sweep on first election: with no predecessor there is nothing
        // half-validated to pick up.
        if old_host.is_some() {
            validate_pending_vars(registry, builder);
        }
        registry.set_is_host(true);
        MigrationOutcome::BecameHost
    } else if old_host == Some(self_id) {
        registry.set_is_host(false);
        MigrationOutcome::LostHost
    } else {
        MigrationOutcome::Unrelated
    }
}

fn validate_pending_vars(registry: &VarRegistry, builder: &mut EnvelopeBuilder) {
    ack_shared::<bool>(registry, builder);
    ack_shared::<f64>(registry, builder);
    ack_shared::<i64>(registry, builder);
    ack_shared::<String>(registry, builder);

    ack_user::<bool>(registry, builder);
    ack_user::<f64>(registry, builder);
    ack_user::<i64>(registry, builder);
    ack_user::<String>(registry, builder);
}

fn ack_shared<T: VarValue>(registry: &VarRegistry, builder: &mut EnvelopeBuilder) {
    for key in T::shared_map(registry).keys() {
        builder.add_shared_ack::<T>(key);
    }
}

fn ack_user<T: VarValue>(registry: &VarRegistry, builder: &mut EnvelopeBuilder) {
    for key in T::user_map(registry).keys() {
        builder.add_user_ack::<T>(key);
    }
}
