//! Inbound envelope routing: host-side arbitration or guest-side apply.
//!
//! The caller re-reads its authority role for every inbound unit and passes
//! it in, so a mid-sequence host migration takes effect on the very next
//! unit with no special-casing here.

use sync_types::{
    KeyedConflict, ParticipantId, SharedValue, SyncEnvelope, UserValue, ValidationStatus,
    VersionedWrite,
};

use crate::builder::EnvelopeBuilder;
use crate::registry::{VarRegistry, VarValue};
use crate::resolver::{resolve, WriteOutcome};

/// The local process's current authority role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Authoritative: arbitrate writes, broadcast acceptances.
    Host,
    /// Non-authoritative: apply host-approved values directly.
    Guest,
}

/// Process one inbound unit.
///
/// Host role: every entry runs through the conflict resolver; accepted
/// values are stored and queued on `builder` for broadcast, rejections are
/// collected into the returned envelope for targeted delivery to `source`
/// only. Guest role: values, acknowledgements and conflicts apply directly
/// to the local mirror and the return value is always `None`.
///
/// Entries whose key is not registered locally are skipped; the handshake
/// refuses participants whose key-space disagrees before any traffic flows.
pub fn receive_envelope(
    registry: &VarRegistry,
    self_id: ParticipantId,
    source: ParticipantId,
    envelope: &SyncEnvelope,
    role: Role,
    builder: &mut EnvelopeBuilder,
) -> Option<SyncEnvelope> {
    let mut conflicts = EnvelopeBuilder::new();

    receive_typed::<bool>(registry, self_id, source, envelope, role, builder, &mut conflicts);
    receive_typed::<f64>(registry, self_id, source, envelope, role, builder, &mut conflicts);
    receive_typed::<i64>(registry, self_id, source, envelope, role, builder, &mut conflicts);
    receive_typed::<String>(registry, self_id, source, envelope, role, builder, &mut conflicts);

    conflicts.take()
}

#[allow(clippy::too_many_arguments)]
fn receive_typed<T: VarValue>(
    registry: &VarRegistry,
    self_id: ParticipantId,
    source: ParticipantId,
    envelope: &SyncEnvelope,
    role: Role,
    builder: &mut EnvelopeBuilder,
    conflicts: &mut EnvelopeBuilder,
) {
    match role {
        Role::Host => {
            host_shared::<T>(registry, source, envelope, builder, conflicts);
            host_user::<T>(registry, source, envelope, builder, conflicts);
        }
        Role::Guest => {
            guest_shared::<T>(registry, self_id, source, envelope);
            guest_user::<T>(registry, self_id, source, envelope);
        }
    }
}

fn host_shared<T: VarValue>(
    registry: &VarRegistry,
    source: ParticipantId,
    envelope: &SyncEnvelope,
    builder: &mut EnvelopeBuilder,
    conflicts: &mut EnvelopeBuilder,
) {
    for entry in T::shared_values(envelope) {
        let Some(var) = registry.shared::<T>(&entry.key) else {
            continue;
        };
        let write = VersionedWrite::new(entry.value.clone(), entry.lock_version, source);
        match resolve(var.authoritative_write(), var.lock_version(), write) {
            WriteOutcome::Accepted(accepted) => {
                if var.value().as_ref() == Some(&accepted.value) {
                    // Equality write: no version bump, no broadcast; the
                    // ack alone resolves the writer's pending status.
                    var.set_status(ValidationStatus::Validated);
                    builder.add_shared_ack::<T>(entry.key.clone());
                    continue;
                }
                var.apply_remote(
                    accepted.value.clone(),
                    accepted.writer,
                    accepted.version,
                    ValidationStatus::Validated,
                );
                builder.add_shared_value(SharedValue {
                    key: entry.key.clone(),
                    value: accepted.value,
                    lock_version: accepted.version,
                    status: ValidationStatus::Validated,
                });
            }
            WriteOutcome::Rejected(conflict) => {
                conflicts.add_shared_conflict(KeyedConflict {
                    key: entry.key.clone(),
                    conflict,
                });
            }
        }
    }
}

fn host_user<T: VarValue>(
    registry: &VarRegistry,
    source: ParticipantId,
    envelope: &SyncEnvelope,
    builder: &mut EnvelopeBuilder,
    conflicts: &mut EnvelopeBuilder,
) {
    for entry in T::user_values(envelope) {
        let Some(var) = registry.user::<T>(&entry.key) else {
            continue;
        };
        let write = VersionedWrite::new(entry.value.clone(), entry.lock_version, source);
        match resolve(var.authoritative_write(), var.lock_version(), write) {
            WriteOutcome::Accepted(accepted) => {
                if var.get(&entry.target).ok().flatten().as_ref() == Some(&accepted.value) {
                    var.set_status(ValidationStatus::Validated);
                    builder.add_user_ack::<T>(entry.key.clone());
                    continue;
                }
                var.apply_remote(
                    accepted.value.clone(),
                    accepted.writer,
                    entry.target,
                    accepted.version,
                    ValidationStatus::Validated,
                );
                builder.add_user_value(UserValue {
                    key: entry.key.clone(),
                    target: entry.target,
                    value: accepted.value,
                    lock_version: accepted.version,
                    status: ValidationStatus::Validated,
                });
            }
            WriteOutcome::Rejected(conflict) => {
                conflicts.add_user_conflict(KeyedConflict {
                    key: entry.key.clone(),
                    conflict,
                });
            }
        }
    }
}

fn guest_shared<T: VarValue>(
    registry: &VarRegistry,
    self_id: ParticipantId,
    source: ParticipantId,
    envelope: &SyncEnvelope,
) {
    for entry in T::shared_values(envelope) {
        let Some(var) = registry.shared::<T>(&entry.key) else {
            continue;
        };
        // The host is authoritative for guests: no arbitration.
        var.apply_remote(entry.value.clone(), source, entry.lock_version, entry.status);
    }

    for key in T::shared_acks(envelope) {
        if let Some(var) = registry.shared::<T>(key) {
            var.set_status(ValidationStatus::Validated);
        }
    }

    for keyed in T::shared_conflicts(envelope) {
        let Some(var) = registry.shared::<T>(&keyed.key) else {
            continue;
        };
        if keyed.conflict.rejected.writer != self_id {
            continue;
        }
        // Our write lost the race: adopt what actually won, then tell the
        // application.
        match &keyed.conflict.accepted {
            Some(accepted) => {
                var.apply_remote(
                    accepted.value.clone(),
                    accepted.writer,
                    accepted.version,
                    ValidationStatus::Validated,
                );
            }
            // Nothing won; the host stored nothing we could mirror.
            None => var.set_status(ValidationStatus::Rejected),
        }
        var.notify_conflict(&keyed.conflict);
    }
}

fn guest_user<T: VarValue>(
    registry: &VarRegistry,
    self_id: ParticipantId,
    source: ParticipantId,
    envelope: &SyncEnvelope,
) {
    for entry in T::user_values(envelope) {
        let Some(var) = registry.user::<T>(&entry.key) else {
            continue;
        };
        var.apply_remote(
            entry.value.clone(),
            source,
            entry.target,
            entry.lock_version,
            entry.status,
        );
    }

    for key in T::user_acks(envelope) {
        if let Some(var) = registry.user::<T>(key) {
            var.set_status(ValidationStatus::Validated);
        }
    }

    for keyed in T::user_conflicts(envelope) {
        let Some(var) = registry.user::<T>(&keyed.key) else {
            continue;
        };
        if keyed.conflict.rejected.writer != self_id {
            continue;
        }
        // The accepted write lives in the winner's slot, not ours, so
        // there is nothing to adopt locally; the host's next broadcast or
        // snapshot asserts the slots. Only the key metadata moves, so the
        // next local write declares a current version.
        var.record_rejection(keyed.conflict.accepted.as_ref().map(|a| a.version));
        var.notify_conflict(&keyed.conflict);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_var::SharedVar;
    use crate::user_var::UserVar;
    use std::sync::{Arc, Mutex};
    use sync_types::{ValidationStatus, VarKey, VersionConflict};

    fn shared_entry<T>(key: &str, value: T, version: u32) -> SharedValue<T> {
        SharedValue {
            key: VarKey::from(key),
            value,
            lock_version: version,
            status: ValidationStatus::Unvalidated,
        }
    }

    #[test]
    fn host_accepts_matching_version_and_queues_broadcast() {
        let registry = VarRegistry::new();
        let var = Arc::new(SharedVar::<i64>::new());
        registry.register_shared("score", var.clone()).unwrap();

        let host = ParticipantId::random();
        let guest = ParticipantId::random();
        let mut builder = EnvelopeBuilder::new();
        let mut envelope = SyncEnvelope::new();
        envelope.shared_ints.push(shared_entry("score", 10, 0));

        let conflicts = receive_envelope(
            &registry,
            host,
            guest,
            &envelope,
            Role::Host,
            &mut builder,
        );

        assert!(conflicts.is_none());
        assert_eq!(var.value(), Some(10));
        assert_eq!(var.lock_version(), 1);
        assert_eq!(var.status(), ValidationStatus::Validated);

        let outbound = builder.take().unwrap();
        assert_eq!(outbound.shared_ints.len(), 1);
        assert_eq!(outbound.shared_ints[0].lock_version, 1);
    }

    #[test]
    fn host_rejects_stale_version_with_targeted_conflict() {
        let registry = VarRegistry::new();
        let var = Arc::new(SharedVar::<i64>::new());
        registry.register_shared("score", var.clone()).unwrap();

        let host = ParticipantId::random();
        let p2 = ParticipantId::random();
        let p3 = ParticipantId::random();
        let mut builder = EnvelopeBuilder::new();

        // P2 wins at version 0.
        let mut first = SyncEnvelope::new();
        first.shared_ints.push(shared_entry("score", 10, 0));
        receive_envelope(&registry, host, p2, &first, Role::Host, &mut builder);
        builder.take();

        // P3 arrives with the same declared version and loses.
        let mut second = SyncEnvelope::new();
        second.shared_ints.push(shared_entry("score", 20, 0));
        let conflicts =
            receive_envelope(&registry, host, p3, &second, Role::Host, &mut builder)
                .expect("the losing write yields a conflict");

        assert_eq!(conflicts.shared_int_conflicts.len(), 1);
        let keyed = &conflicts.shared_int_conflicts[0];
        assert_eq!(keyed.conflict.rejected.value, 20);
        assert_eq!(keyed.conflict.rejected.writer, p3);
        let accepted = keyed.conflict.accepted.as_ref().unwrap();
        assert_eq!(accepted.value, 10);
        assert_eq!(accepted.version, 1);
        assert_eq!(accepted.writer, p2);

        // The rejection queued nothing for broadcast.
        assert!(builder.take().is_none());
        assert_eq!(var.value(), Some(10), "stored value is untouched");
    }

    #[test]
    fn host_rejection_on_a_virgin_key_reports_no_accepted_write() {
        let registry = VarRegistry::new();
        let var = Arc::new(SharedVar::<i64>::new());
        registry.register_shared("score", var.clone()).unwrap();

        let host = ParticipantId::random();
        let mut builder = EnvelopeBuilder::new();
        let mut envelope = SyncEnvelope::new();
        envelope.shared_ints.push(shared_entry("score", 10, 5));

        let conflicts = receive_envelope(
            &registry,
            host,
            ParticipantId::random(),
            &envelope,
            Role::Host,
            &mut builder,
        )
        .expect("the mismatched write yields a conflict");

        let keyed = &conflicts.shared_int_conflicts[0];
        assert!(keyed.conflict.accepted.is_none());
        assert_eq!(var.value(), None, "nothing was ever stored");
    }

    #[test]
    fn host_treats_equality_write_as_ack_only() {
        let registry = VarRegistry::new();
        let var = Arc::new(SharedVar::<i64>::new());
        registry.register_shared("score", var.clone()).unwrap();

        let host = ParticipantId::random();
        let guest = ParticipantId::random();
        let mut builder = EnvelopeBuilder::new();

        let mut first = SyncEnvelope::new();
        first.shared_ints.push(shared_entry("score", 10, 0));
        receive_envelope(&registry, host, guest, &first, Role::Host, &mut builder);
        builder.take();

        // Same value again at the now-current version.
        let mut second = SyncEnvelope::new();
        second.shared_ints.push(shared_entry("score", 10, 1));
        receive_envelope(&registry, host, guest, &second, Role::Host, &mut builder);

        assert_eq!(var.lock_version(), 1, "no version bump for an equal value");
        let outbound = builder.take().unwrap();
        assert!(outbound.shared_ints.is_empty(), "no value broadcast");
        assert_eq!(outbound.shared_int_acks, vec![VarKey::from("score")]);
    }

    #[test]
    fn guest_applies_host_values_without_arbitration() {
        let registry = VarRegistry::new();
        let var = Arc::new(SharedVar::<String>::new());
        registry.register_shared("phase", var.clone()).unwrap();

        let me = ParticipantId::random();
        let host = ParticipantId::random();
        let mut builder = EnvelopeBuilder::new();
        let mut envelope = SyncEnvelope::new();
        envelope.shared_strings.push(SharedValue {
            key: VarKey::from("phase"),
            value: "playing".to_string(),
            lock_version: 4,
            status: ValidationStatus::Validated,
        });

        let conflicts = receive_envelope(
            &registry,
            me,
            host,
            &envelope,
            Role::Guest,
            &mut builder,
        );

        assert!(conflicts.is_none());
        assert!(builder.is_empty(), "guests queue nothing outbound");
        assert_eq!(var.value(), Some("playing".to_string()));
        assert_eq!(var.lock_version(), 4);
    }

    #[test]
    fn guest_ack_validates_the_key() {
        let registry = VarRegistry::new();
        let var = Arc::new(SharedVar::<bool>::new());
        registry.register_shared("ready", var.clone()).unwrap();
        let me = ParticipantId::random();
        var.set_local(true, me, 0, ValidationStatus::Unvalidated);

        let host = ParticipantId::random();
        let mut builder = EnvelopeBuilder::new();
        let mut envelope = SyncEnvelope::new();
        envelope.shared_bool_acks.push(VarKey::from("ready"));

        receive_envelope(&registry, me, host, &envelope, Role::Guest, &mut builder);

        assert_eq!(var.status(), ValidationStatus::Validated);
    }

    #[test]
    fn guest_adopts_accepted_write_and_hears_about_the_conflict() {
        let registry = VarRegistry::new();
        let var = Arc::new(SharedVar::<i64>::new());
        registry.register_shared("score", var.clone()).unwrap();

        let me = ParticipantId::random();
        let p2 = ParticipantId::random();
        let host = ParticipantId::random();

        // Our optimistic write that is about to be rejected.
        var.set_local(20, me, 1, ValidationStatus::Unvalidated);

        let heard = Arc::new(Mutex::new(Vec::new()));
        let sink = heard.clone();
        var.on_conflict(move |conflict| {
            sink.lock().unwrap().push((
                conflict.rejected.value,
                conflict.accepted.as_ref().unwrap().value,
            ));
        });

        let mut envelope = SyncEnvelope::new();
        envelope.shared_int_conflicts.push(KeyedConflict {
            key: VarKey::from("score"),
            conflict: VersionConflict {
                rejected: VersionedWrite::new(20i64, 1, me),
                accepted: Some(VersionedWrite::new(10i64, 2, p2)),
            },
        });

        let mut builder = EnvelopeBuilder::new();
        receive_envelope(&registry, me, host, &envelope, Role::Guest, &mut builder);

        assert_eq!(var.value(), Some(10), "accepted write is adopted");
        assert_eq!(var.lock_version(), 2);
        assert_eq!(*heard.lock().unwrap(), vec![(20, 10)]);
    }

    #[test]
    fn guest_shared_conflict_without_accepted_side_marks_rejection() {
        let registry = VarRegistry::new();
        let var = Arc::new(SharedVar::<i64>::new());
        registry.register_shared("score", var.clone()).unwrap();

        let me = ParticipantId::random();
        var.set_local(20, me, 3, ValidationStatus::Unvalidated);

        let mut envelope = SyncEnvelope::new();
        envelope.shared_int_conflicts.push(KeyedConflict {
            key: VarKey::from("score"),
            conflict: VersionConflict {
                rejected: VersionedWrite::new(20i64, 3, me),
                accepted: None,
            },
        });

        let mut builder = EnvelopeBuilder::new();
        receive_envelope(
            &registry,
            me,
            ParticipantId::random(),
            &envelope,
            Role::Guest,
            &mut builder,
        );

        assert_eq!(var.value(), Some(20), "nothing to adopt, value stays");
        assert_eq!(var.status(), ValidationStatus::Rejected);
    }

    #[test]
    fn conflict_for_someone_else_is_ignored() {
        let registry = VarRegistry::new();
        let var = Arc::new(SharedVar::<i64>::new());
        registry.register_shared("score", var.clone()).unwrap();

        let me = ParticipantId::random();
        let other = ParticipantId::random();
        var.set_local(10, me, 2, ValidationStatus::Validated);

        let mut envelope = SyncEnvelope::new();
        envelope.shared_int_conflicts.push(KeyedConflict {
            key: VarKey::from("score"),
            conflict: VersionConflict {
                rejected: VersionedWrite::new(99i64, 1, other),
                accepted: Some(VersionedWrite::new(10i64, 2, me)),
            },
        });

        let mut builder = EnvelopeBuilder::new();
        receive_envelope(
            &registry,
            me,
            ParticipantId::random(),
            &envelope,
            Role::Guest,
            &mut builder,
        );

        assert_eq!(var.value(), Some(10), "not our conflict, nothing changes");
    }

    #[test]
    fn host_arbitrates_user_slots_with_one_version_per_key() {
        let registry = VarRegistry::new();
        let var = Arc::new(UserVar::<f64>::new());
        registry.register_user("stamina", var.clone()).unwrap();

        let host = ParticipantId::random();
        let guest = ParticipantId::random();
        let mut builder = EnvelopeBuilder::new();
        let mut envelope = SyncEnvelope::new();
        envelope.user_floats.push(UserValue {
            key: VarKey::from("stamina"),
            target: guest,
            value: 0.5,
            lock_version: 0,
            status: ValidationStatus::Unvalidated,
        });

        let conflicts = receive_envelope(
            &registry,
            host,
            guest,
            &envelope,
            Role::Host,
            &mut builder,
        );

        assert!(conflicts.is_none());
        assert_eq!(var.get(&guest).unwrap(), Some(0.5));
        assert_eq!(var.lock_version(), 1);

        let outbound = builder.take().unwrap();
        assert_eq!(outbound.user_floats.len(), 1);
        assert_eq!(outbound.user_floats[0].target, guest);
    }

    #[test]
    fn user_conflict_pairs_with_the_key_authoritative_write() {
        let registry = VarRegistry::new();
        let var = Arc::new(UserVar::<i64>::new());
        registry.register_user("combo", var.clone()).unwrap();

        let host = ParticipantId::random();
        let p2 = ParticipantId::random();
        let p3 = ParticipantId::random();
        var.observe(p2);
        var.observe(p3);
        let mut builder = EnvelopeBuilder::new();

        // P2's slot write wins the key's version race.
        let mut first = SyncEnvelope::new();
        first.user_ints.push(UserValue {
            key: VarKey::from("combo"),
            target: p2,
            value: 5,
            lock_version: 0,
            status: ValidationStatus::Unvalidated,
        });
        receive_envelope(&registry, host, p2, &first, Role::Host, &mut builder);
        builder.take();

        // P3 races its own slot at the stale version; the conflict must
        // name P2's write, the one actually stored.
        let mut second = SyncEnvelope::new();
        second.user_ints.push(UserValue {
            key: VarKey::from("combo"),
            target: p3,
            value: 9,
            lock_version: 0,
            status: ValidationStatus::Unvalidated,
        });
        let conflicts =
            receive_envelope(&registry, host, p3, &second, Role::Host, &mut builder)
                .expect("the losing write yields a conflict");

        let keyed = &conflicts.user_int_conflicts[0];
        assert_eq!(keyed.conflict.rejected.value, 9);
        assert_eq!(keyed.conflict.rejected.writer, p3);
        let accepted = keyed.conflict.accepted.as_ref().unwrap();
        assert_eq!(accepted.value, 5);
        assert_eq!(accepted.version, 1);
        assert_eq!(accepted.writer, p2);
        assert_eq!(var.get(&p3).unwrap(), None, "the losing slot stays empty");
    }

    #[test]
    fn user_conflict_marks_the_key_rejected_without_touching_slots() {
        let registry = VarRegistry::new();
        let var = Arc::new(UserVar::<i64>::new());
        registry.register_user("combo", var.clone()).unwrap();

        let me = ParticipantId::random();
        let p2 = ParticipantId::random();
        let host = ParticipantId::random();
        var.observe(p2);

        // Our optimistic write to our own slot; P2's racing write to its
        // slot won the key's version race.
        var.set_local(7, me, me, 0, ValidationStatus::Unvalidated);

        let heard = Arc::new(Mutex::new(Vec::new()));
        let sink = heard.clone();
        var.on_conflict(move |conflict| {
            sink.lock().unwrap().push(conflict.rejected.value);
        });

        let mut envelope = SyncEnvelope::new();
        envelope.user_int_conflicts.push(KeyedConflict {
            key: VarKey::from("combo"),
            conflict: VersionConflict {
                rejected: VersionedWrite::new(7i64, 0, me),
                accepted: Some(VersionedWrite::new(99i64, 1, p2)),
            },
        });

        let mut builder = EnvelopeBuilder::new();
        receive_envelope(&registry, me, host, &envelope, Role::Guest, &mut builder);

        // The winner's value belongs to the winner's slot; ours keeps the
        // pending local value until the host asserts otherwise.
        assert_eq!(var.get(&me).unwrap(), Some(7));
        assert_eq!(var.get(&p2).unwrap(), None);
        assert_eq!(var.lock_version(), 1, "key version catches up");
        assert_eq!(var.status(), ValidationStatus::Rejected);
        assert_eq!(*heard.lock().unwrap(), vec![7]);
    }

    #[test]
    fn rejected_user_key_revalidates_on_the_next_host_assertion() {
        let registry = VarRegistry::new();
        let var = Arc::new(UserVar::<i64>::new());
        registry.register_user("combo", var.clone()).unwrap();

        let me = ParticipantId::random();
        let p2 = ParticipantId::random();
        let host = ParticipantId::random();
        var.observe(p2);
        var.set_local(7, me, me, 0, ValidationStatus::Unvalidated);

        let mut conflict = SyncEnvelope::new();
        conflict.user_int_conflicts.push(KeyedConflict {
            key: VarKey::from("combo"),
            conflict: VersionConflict {
                rejected: VersionedWrite::new(7i64, 0, me),
                accepted: Some(VersionedWrite::new(99i64, 1, p2)),
            },
        });
        let mut builder = EnvelopeBuilder::new();
        receive_envelope(&registry, me, host, &conflict, Role::Guest, &mut builder);
        assert_eq!(var.status(), ValidationStatus::Rejected);

        // The host's broadcast of the winning write re-asserts the key.
        let mut broadcast = SyncEnvelope::new();
        broadcast.user_ints.push(UserValue {
            key: VarKey::from("combo"),
            target: p2,
            value: 99,
            lock_version: 1,
            status: ValidationStatus::Validated,
        });
        receive_envelope(&registry, me, host, &broadcast, Role::Guest, &mut builder);

        assert_eq!(var.status(), ValidationStatus::Validated);
        assert_eq!(var.get(&p2).unwrap(), Some(99));
        assert_eq!(var.get(&me).unwrap(), Some(7), "our slot is still ours");
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let registry = VarRegistry::new();
        let host = ParticipantId::random();
        let mut builder = EnvelopeBuilder::new();
        let mut envelope = SyncEnvelope::new();
        envelope
            .shared_ints
            .push(shared_entry("never-registered", 1, 0));

        let conflicts = receive_envelope(
            &registry,
            host,
            ParticipantId::random(),
            &envelope,
            Role::Host,
            &mut builder,
        );

        assert!(conflicts.is_none());
        assert!(builder.is_empty());
    }
}
