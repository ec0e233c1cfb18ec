//! Shared variables: one authoritative value replicated to all participants.

use std::sync::{Arc, Mutex};

use sync_types::{ParticipantId, ValidationStatus, VersionConflict, VersionedWrite};

/// A change notification for a shared variable.
#[derive(Debug, Clone)]
pub struct SharedVarEvent<T> {
    /// The participant that authored the change.
    pub source: ParticipantId,
    /// The value before the change, if any.
    pub old: Option<T>,
    /// The value after the change.
    pub new: T,
}

pub(crate) type Observer<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// One authoritative value of type T, visible identically to all participants.
///
/// The store owns its own exclusive lock; operations are short in-memory
/// critical sections and observers are invoked after the lock is released,
/// against a snapshot of the subscriber list taken while it was held.
///
/// Version semantics belong to the conflict resolver: the store records
/// whatever lock version and validation status it is handed.
pub struct SharedVar<T> {
    state: Mutex<VarState<T>>,
}

struct VarState<T> {
    value: Option<T>,
    lock_version: u32,
    status: ValidationStatus,
    is_host: bool,
    self_id: Option<ParticipantId>,
    last_writer: Option<ParticipantId>,
    local_observers: Vec<Observer<SharedVarEvent<T>>>,
    remote_observers: Vec<Observer<SharedVarEvent<T>>>,
    conflict_observers: Vec<Observer<VersionConflict<T>>>,
}

impl<T> Default for VarState<T> {
    fn default() -> Self {
        Self {
            value: None,
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

impl<T> Default for SharedVar<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SharedVar<T> {
    /// Create an empty shared variable with no value yet.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VarState::default()),
        }
    }

    /// The current lock version.
    pub fn lock_version(&self) -> u32 {
        self.state.lock().unwrap().lock_version
    }

    /// The current validation status.
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
        self.state.lock().unwrap().self_id = Some(id);
    }

    // Flipped only by the host migrator, for every variable at once.
    pub(crate) fn set_is_host(&self, is_host: bool) {
        self.state.lock().unwrap().is_host = is_host;
    }

    /// Subscribe to changes authored by the local participant.
    ///
    /// Observers fire in registration order against a snapshot of the list.
    pub fn on_local_change(&self, observer: impl Fn(&SharedVarEvent<T>) + Send + Sync + 'static) {
        self.state
            .lock()
            .unwrap()
            .local_observers
            .push(Arc::new(observer));
    }

    /// Subscribe to changes applied from inbound traffic.
    pub fn on_remote_change(&self, observer: impl Fn(&SharedVarEvent<T>) + Send + Sync + 'static) {
        self.state
            .lock()
            .unwrap()
            .remote_observers
            .push(Arc::new(observer));
    }

    /// Subscribe to version conflicts that rejected a write from this process.
    pub fn on_conflict(&self, observer: impl Fn(&VersionConflict<T>) + Send + Sync + 'static) {
        self.state
            .lock()
            .unwrap()
            .conflict_observers
            .push(Arc::new(observer));
    }

    /// Clear value, version, identity and all subscriptions.
    ///
    /// Used only at match teardown.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        *state = VarState::default();
    }
}

impl<T: Clone + PartialEq> SharedVar<T> {
    /// The current value, or `None` if no value has been stored yet.
    pub fn value(&self) -> Option<T> {
        self.state.lock().unwrap().value.clone()
    }

    /// The write currently authoritative for this key, if any value is stored.
    pub(crate) fn authoritative_write(&self) -> Option<VersionedWrite<T>> {
        let state = self.state.lock().unwrap();
        match (&state.value, state.last_writer) {
            (Some(value), Some(writer)) => Some(VersionedWrite::new(
                value.clone(),
                state.lock_version,
                writer,
            )),
            _ => None,
        }
    }

    /// Store a locally authored value, recording the given version and status.
    ///
    /// A value equal to the current value is a no-op: no mutation, no event,
    /// and the caller must not emit anything for it. Returns whether the
    /// value changed.
    pub fn set_local(
        &self,
        value: T,
        source: ParticipantId,
        lock_version: u32,
        status: ValidationStatus,
    ) -> bool {
        let (event, observers) = {
            let mut state = self.state.lock().unwrap();
            if state.value.as_ref() == Some(&value) {
                return false;
            }
            let old = state.value.replace(value.clone());
            state.lock_version = lock_version;
            state.status = status;
            state.last_writer = Some(source);
            (
                SharedVarEvent {
                    source,
                    old,
                    new: value,
                },
                state.local_observers.clone(),
            )
        };
        for observer in &observers {
            observer(&event);
        }
        true
    }

    /// Apply a host-approved value from inbound traffic.
    ///
    /// Always records the carried version and status (the host may advance
    /// the version without changing the value); remote-change observers fire
    /// only when the value actually changed.
    pub fn apply_remote(
        &self,
        value: T,
        source: ParticipantId,
        lock_version: u32,
        status: ValidationStatus,
    ) -> bool {
        let (event, observers) = {
            let mut state = self.state.lock().unwrap();
            state.lock_version = lock_version;
            state.status = status;
            state.last_writer = Some(source);
            if state.value.as_ref() == Some(&value) {
                return false;
            }
            let old = state.value.replace(value.clone());
            (
                SharedVarEvent {
                    source,
                    old,
                    new: value,
                },
                state.remote_observers.clone(),
            )
        };
        for observer in &observers {
            observer(&event);
        }
        true
    }

    pub(crate) fn set_status(&self, status: ValidationStatus) {
        self.state.lock().unwrap().status = status;
    }

    pub(crate) fn notify_conflict(&self, conflict: &VersionConflict<T>) {
        let observers = self.state.lock().unwrap().conflict_observers.clone();
        for observer in &observers {
            observer(conflict);
        }
    }
}
