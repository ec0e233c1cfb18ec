//! Per-participant variables: one replicated value slot per known participant.

use std::collections::HashMap;
use std::sync::Mutex;

use sync_types::{ParticipantId, SyncError, ValidationStatus, VersionConflict, VersionedWrite};

use crate::shared_var::Observer;

/// A change notification for a per-participant variable.
#[derive(Debug, Clone)]
pub struct UserVarEvent<T> {
    /// The participant that authored the change.
    pub source: ParticipantId,
    /// The participant whose slot changed.
    pub target: ParticipantId,
    /// The slot value before the change, if any.
    pub old: Option<T>,
    /// The slot value after the change.
    pub new: T,
}

/// A mapping from participant to value, one slot per observed participant.
///
/// The local participant's own slot is written by local code; all other
/// slots change only from inbound traffic. Lock version and validation
/// status are shared across the key, not tracked per slot.
///
/// Slots exist only for participants this process has observed (via a join
/// notification or inbound traffic); looking up anyone else is an error,
/// never a default.
pub struct UserVar<T> {
    state: Mutex<UserState<T>>,
}

struct UserState<T> {
    slots: HashMap<ParticipantId, Option<T>>,
    lock_version: u32,
    status: ValidationStatus,
    is_host: bool,
    self_id: Option<ParticipantId>,
    last_writer: Option<ParticipantId>,
    local_observers: Vec<Observer<UserVarEvent<T>>>,
    remote_observers: Vec<Observer<UserVarEvent<T>>>,
    conflict_observers: Vec<Observer<VersionConflict<T>>>,
}

impl<T> Default for UserState<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            lock_version: 0,
            status: ValidationStatus::Unvalidated,
            is_host: false,
            self_id: None,
            last_writer: None,
            local_observers: Vec::new(),
            remote_observers: Vec::new(),
            conflict_observers: Vec::new(),
        }
    }
}

impl<T> Default for UserVar<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UserVar<T> {
    /// Create an empty per-participant variable with no slots.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(UserState::default()),
        }
    }

    /// The current lock version (shared across all slots of this key).
    pub fn lock_version(&self) -> u32 {
        self.state.lock().unwrap().lock_version
    }

    /// The current validation status (shared across all slots of this key).
    pub fn status(&self) -> ValidationStatus {
        self.state.lock().unwrap().status
    }

    /// Whether this process currently holds host authority for the match.
    pub fn is_host(&self) -> bool {
        self.state.lock().unwrap().is_host
    }

    /// The local participant identity, once the match assigns it.
    pub fn self_id(&self) -> Option<ParticipantId> {
        self.state.lock().unwrap().self_id
    }

    pub(crate) fn set_self(&self, id: ParticipantId) {
        let mut state = self.state.lock().unwrap();
        state.self_id = Some(id);
        state.slots.entry(id).or_insert(None);
    }

    pub(crate) fn set_is_host(&self, is_host: bool) {
        self.state.lock().unwrap().is_host = is_host;
    }

    /// Seed an empty slot for a newly observed participant.
    pub fn observe(&self, participant: ParticipantId) {
        self.state
            .lock()
            .unwrap()
            .slots
            .entry(participant)
            .or_insert(None);
    }

    /// Whether a slot exists and holds a value. Never errors.
    pub fn has_value(&self, participant: &ParticipantId) -> bool {
        matches!(
            self.state.lock().unwrap().slots.get(participant),
            Some(Some(_))
        )
    }

    /// Subscribe to changes authored by the local participant.
    pub fn on_local_change(&self, observer: impl Fn(&UserVarEvent<T>) + Send + Sync + 'static) {
        self.state
            .lock()
            .unwrap()
            .local_observers
            .push(std::sync::Arc::new(observer));
    }

    /// Subscribe to changes applied from inbound traffic.
    pub fn on_remote_change(&self, observer: impl Fn(&UserVarEvent<T>) + Send + Sync + 'static) {
        self.state
            .lock()
            .unwrap()
            .remote_observers
            .push(std::sync::Arc::new(observer));
    }

    /// Subscribe to version conflicts that rejected a write from this process.
    pub fn on_conflict(&self, observer: impl Fn(&VersionConflict<T>) + Send + Sync + 'static) {
        self.state
            .lock()
            .unwrap()
            .conflict_observers
            .push(std::sync::Arc::new(observer));
    }

    /// Clear slots, version, identity and all subscriptions.
    ///
    /// Used only at match teardown.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        *state = UserState::default();
    }
}

impl<T: Clone + PartialEq> UserVar<T> {
    /// The value in a participant's slot.
    ///
    /// Fails with [`SyncError::UnknownPresence`] for a participant never
    /// observed; a known participant with no value yet yields `Ok(None)`.
    pub fn get(&self, participant: &ParticipantId) -> Result<Option<T>, SyncError> {
        self.state
            .lock()
            .unwrap()
            .slots
            .get(participant)
            .cloned()
            .ok_or(SyncError::UnknownPresence {
                participant: *participant,
            })
    }

    /// The value in the local participant's own slot.
    pub fn get_self(&self) -> Result<Option<T>, SyncError> {
        let self_id = {
            let state = self.state.lock().unwrap();
            state.self_id
        };
        match self_id {
            Some(id) => self.get(&id),
            None => Ok(None),
        }
    }

    /// The write currently authoritative for the key, if any.
    ///
    /// The version race is per key, not per slot, so the authoritative
    /// write is the last accepted writer's slot value at the key's lock
    /// version.
    pub(crate) fn authoritative_write(&self) -> Option<VersionedWrite<T>> {
        let state = self.state.lock().unwrap();
        let writer = state.last_writer?;
        let value = state.slots.get(&writer)?.clone()?;
        Some(VersionedWrite::new(value, state.lock_version, writer))
    }

    /// Store a locally authored value into a slot.
    ///
    /// Creates the slot if needed (a write observes its target). A value
    /// equal to the slot's current value is a no-op. Returns whether the
    /// value changed.
    pub fn set_local(
        &self,
        value: T,
        source: ParticipantId,
        target: ParticipantId,
        lock_version: u32,
        status: ValidationStatus,
    ) -> bool {
        self.store(value, source, target, lock_version, status, false)
    }

    /// Apply a host-approved slot value from inbound traffic.
    ///
    /// Always records the carried version and status; remote-change
    /// observers fire only when the slot value actually changed.
    pub fn apply_remote(
        &self,
        value: T,
        source: ParticipantId,
        target: ParticipantId,
        lock_version: u32,
        status: ValidationStatus,
    ) -> bool {
        self.store(value, source, target, lock_version, status, true)
    }

    fn store(
        &self,
        value: T,
        source: ParticipantId,
        target: ParticipantId,
        lock_version: u32,
        status: ValidationStatus,
        remote: bool,
    ) -> bool {
        let (event, observers) = {
            let mut state = self.state.lock().unwrap();
            let slot = state.slots.entry(target).or_insert(None);
            if slot.as_ref() == Some(&value) {
                if remote {
                    // Host-assigned metadata still applies to the key.
                    state.lock_version = lock_version;
                    state.status = status;
                }
                return false;
            }
            let old = slot.replace(value.clone());
            state.lock_version = lock_version;
            state.status = status;
            state.last_writer = Some(source);
            let observers = if remote {
                state.remote_observers.clone()
            } else {
                state.local_observers.clone()
            };
            (
                UserVarEvent {
                    source,
                    target,
                    old,
                    new: value,
                },
                observers,
            )
        };
        for observer in &observers {
            observer(&event);
        }
        true
    }

    /// Snapshot every slot that holds a value, for handshake state transfer.
    pub(crate) fn slots(&self) -> Vec<(ParticipantId, T)> {
        self.state
            .lock()
            .unwrap()
            .slots
            .iter()
            .filter_map(|(id, value)| value.clone().map(|v| (*id, v)))
            .collect()
    }

    pub(crate) fn set_status(&self, status: ValidationStatus) {
        self.state.lock().unwrap().status = status;
    }

    // A lost race: the key's version catches up to the authoritative one
    // (when known) so the next local write declares a current version, but
    // no slot changes.
    pub(crate) fn record_rejection(&self, lock_version: Option<u32>) {
        let mut state = self.state.lock().unwrap();
        if let Some(version) = lock_version {
            state.lock_version = version;
        }
        state.status = ValidationStatus::Rejected;
    }

    pub(crate) fn notify_conflict(&self, conflict: &VersionConflict<T>) {
        let observers = self.state.lock().unwrap().conflict_observers.clone();
        for observer in &observers {
            observer(conflict);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn unknown_presence_lookup_fails() {
        let var: UserVar<i64> = UserVar::new();
        let stranger = ParticipantId::random();

        let err = var.get(&stranger).unwrap_err();
        assert!(matches!(err, SyncError::UnknownPresence { participant } if participant == stranger));
    }

    #[test]
    fn observed_participant_without_value_reads_none() {
        let var: UserVar<String> = UserVar::new();
        let p = ParticipantId::random();
        var.observe(p);

        assert_eq!(var.get(&p).unwrap(), None);
        assert!(!var.has_value(&p));
    }

    #[test]
    fn has_value_never_errors() {
        let var: UserVar<bool> = UserVar::new();
        assert!(!var.has_value(&ParticipantId::random()));
    }

    #[test]
    fn local_write_creates_the_target_slot() {
        let var = UserVar::new();
        let me = ParticipantId::random();

        var.set_local(3i64, me, me, 1, ValidationStatus::Unvalidated);

        assert_eq!(var.get(&me).unwrap(), Some(3));
        assert!(var.has_value(&me));
    }

    #[test]
    fn equal_slot_value_is_a_noop() {
        let var = UserVar::new();
        let me = ParticipantId::random();
        var.set_local(3i64, me, me, 1, ValidationStatus::Validated);

        let fired = Arc::new(AtomicUsize::new(0));
        let count = fired.clone();
        var.on_local_change(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        let changed = var.set_local(3i64, me, me, 9, ValidationStatus::Unvalidated);

        assert!(!changed);
        assert_eq!(var.lock_version(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn slots_are_independent_per_participant() {
        let var = UserVar::new();
        let host = ParticipantId::random();
        let p2 = ParticipantId::random();
        let p3 = ParticipantId::random();

        var.apply_remote(10i64, host, p2, 1, ValidationStatus::Validated);
        var.apply_remote(20i64, host, p3, 2, ValidationStatus::Validated);

        assert_eq!(var.get(&p2).unwrap(), Some(10));
        assert_eq!(var.get(&p3).unwrap(), Some(20));
    }

    #[test]
    fn remote_event_names_source_and_target() {
        let var = UserVar::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        var.on_remote_change(move |event: &UserVarEvent<i64>| {
            sink.lock()
                .unwrap()
                .push((event.source, event.target, event.new));
        });

        let host = ParticipantId::random();
        let target = ParticipantId::random();
        var.apply_remote(5i64, host, target, 1, ValidationStatus::Validated);

        assert_eq!(*seen.lock().unwrap(), vec![(host, target, 5)]);
    }

    #[test]
    fn reset_clears_slots_and_identity() {
        let var = UserVar::new();
        let me = ParticipantId::random();
        var.set_self(me);
        var.set_local(1i64, me, me, 1, ValidationStatus::Validated);

        var.reset();

        assert!(var.get(&me).is_err(), "slots are gone after reset");
        assert_eq!(var.self_id(), None);
        assert_eq!(var.lock_version(), 0);
    }
}
