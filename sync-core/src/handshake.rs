//! Key-space exchange performed when a participant joins.
//!
//! A joiner advertises every key it intends to synchronize; the host
//! cross-checks the set against its own registry. A mismatch blocks the
//! participant rather than silently dropping unknown keys.

use sync_types::{
    HandshakeRequest, SharedValue, SyncEnvelope, SyncError, UserValue,
};

use crate::registry::{VarRegistry, VarValue};

/// Build the handshake advertisement for this registry's complete key-space.
pub fn handshake_request(registry: &VarRegistry) -> HandshakeRequest {
    HandshakeRequest {
        shared_keys: registry.shared_keys(),
        user_keys: registry.user_keys(),
    }
}

/// Host-side check of a joiner's advertised key-space.
///
/// Any difference in either partition fails with
/// [`SyncError::HandshakeMismatch`]; the caller must then refuse further
/// synchronization traffic from that participant.
pub fn check_handshake(registry: &VarRegistry, request: &HandshakeRequest) -> Result<(), SyncError> {
    let shared = registry.shared_keys();
    let user = registry.user_keys();

    let missing = shared
        .iter()
        .filter(|k| !request.shared_keys.contains(k))
        .count()
        + user.iter().filter(|k| !request.user_keys.contains(k)).count();
    let unexpected = request
        .shared_keys
        .iter()
        .filter(|k| !shared.contains(k))
        .count()
        + request.user_keys.iter().filter(|k| !user.contains(k)).count();

    if missing > 0 || unexpected > 0 {
        return Err(SyncError::HandshakeMismatch {
            missing,
            unexpected,
        });
    }
    Ok(())
}

/// Snapshot every stored value into one envelope.
///
/// Sent by the host alongside an accepted handshake so a late joiner
/// converges immediately instead of waiting for the next write to each key.
pub fn snapshot(registry: &VarRegistry) -> SyncEnvelope {
    let mut envelope = SyncEnvelope::new();
    snapshot_typed::<bool>(registry, &mut envelope);
    snapshot_typed::<f64>(registry, &mut envelope);
    snapshot_typed::<i64>(registry, &mut envelope);
    snapshot_typed::<String>(registry, &mut envelope);
    envelope
}

fn snapshot_typed<T: VarValue>(registry: &VarRegistry, envelope: &mut SyncEnvelope) {
    for (key, var) in T::shared_map(registry).entries() {
        if let Some(value) = var.value() {
            T::shared_values_mut(envelope).push(SharedValue {
                key: key.clone(),
                value,
                lock_version: var.lock_version(),
                status: var.status(),
            });
        }
    }

    for (key, var) in T::user_map(registry).entries() {
        let lock_version = var.lock_version();
        let status = var.status();
        for (target, value) in var.slots() {
            T::user_values_mut(envelope).push(UserValue {
                key: key.clone(),
                target,
                value,
                lock_version,
                status,
            });
        }
    }
}
