//! The variable registry: keyed ownership of every store in a match.
//!
//! Partitioned first by shared vs per-participant, then by the four
//! primitive value types. Pure storage with uniqueness enforcement; no
//! synchronization logic lives here.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use sync_types::{ParticipantId, SyncError, VarKey, WireValue};

use crate::shared_var::SharedVar;
use crate::user_var::UserVar;

/// One typed partition slice: key → store.
pub struct VarMap<V> {
    vars: Mutex<HashMap<VarKey, Arc<V>>>,
}

impl<V> Default for VarMap<V> {
    fn default() -> Self {
        Self {
            vars: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> VarMap<V> {
    fn insert(&self, key: VarKey, var: Arc<V>) {
        self.vars.lock().unwrap().insert(key, var);
    }

    /// Look up a store by key.
    pub fn get(&self, key: &VarKey) -> Option<Arc<V>> {
        self.vars.lock().unwrap().get(key).cloned()
    }

    /// Snapshot of all keys in this slice. Order is not significant.
    pub fn keys(&self) -> Vec<VarKey> {
        self.vars.lock().unwrap().keys().cloned().collect()
    }

    /// Snapshot of all entries in this slice. Order is not significant.
    pub fn entries(&self) -> Vec<(VarKey, Arc<V>)> {
        self.vars
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Registry access for the four synchronized value types.
///
/// Extends [`WireValue`]'s envelope-bucket access with the matching registry
/// partition slices, so ingress and migration code can fan out over all
/// types generically.
pub trait VarValue: WireValue {
    /// The shared-partition slice for this type.
    fn shared_map(registry: &VarRegistry) -> &VarMap<SharedVar<Self>>;
    /// The per-participant-partition slice for this type.
    fn user_map(registry: &VarRegistry) -> &VarMap<UserVar<Self>>;
}

macro_rules! impl_var_value {
    ($ty:ty, $shared:ident, $user:ident) => {
        impl VarValue for $ty {
            fn shared_map(registry: &VarRegistry) -> &VarMap<SharedVar<Self>> {
                &registry.$shared
            }
            fn user_map(registry: &VarRegistry) -> &VarMap<UserVar<Self>> {
                &registry.$user
            }
        }
    };
}

impl_var_value!(bool, shared_bools, user_bools);
impl_var_value!(f64, shared_floats, user_floats);
impl_var_value!(i64, shared_ints, user_ints);
impl_var_value!(String, shared_strings, user_strings);

/// Owns all variable stores for one match.
#[derive(Default)]
pub struct VarRegistry {
    shared_bools: VarMap<SharedVar<bool>>,
    shared_floats: VarMap<SharedVar<f64>>,
    shared_ints: VarMap<SharedVar<i64>>,
    shared_strings: VarMap<SharedVar<String>>,

    user_bools: VarMap<UserVar<bool>>,
    user_floats: VarMap<UserVar<f64>>,
    user_ints: VarMap<UserVar<i64>>,
    user_strings: VarMap<UserVar<String>>,

    // Key uniqueness is per partition, across all four type slices.
    shared_keys: Mutex<HashSet<VarKey>>,
    user_keys: Mutex<HashSet<VarKey>>,
}

impl VarRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared variable under a key.
    ///
    /// Fails with [`SyncError::DuplicateKey`] if the key is already taken in
    /// the shared partition, regardless of value type.
    pub fn register_shared<T: VarValue>(
        &self,
        key: impl Into<VarKey>,
        var: Arc<SharedVar<T>>,
    ) -> Result<(), SyncError> {
        let key = key.into();
        if !self.shared_keys.lock().unwrap().insert(key.clone()) {
            return Err(SyncError::DuplicateKey { key });
        }
        T::shared_map(self).insert(key, var);
        Ok(())
    }

    /// Register a per-participant variable under a key.
    ///
    /// Fails with [`SyncError::DuplicateKey`] if the key is already taken in
    /// the per-participant partition, regardless of value type.
    pub fn register_user<T: VarValue>(
        &self,
        key: impl Into<VarKey>,
        var: Arc<UserVar<T>>,
    ) -> Result<(), SyncError> {
        let key = key.into();
        if !self.user_keys.lock().unwrap().insert(key.clone()) {
            return Err(SyncError::DuplicateKey { key });
        }
        T::user_map(self).insert(key, var);
        Ok(())
    }

    /// Look up a shared variable by key and type.
    pub fn shared<T: VarValue>(&self, key: &VarKey) -> Option<Arc<SharedVar<T>>> {
        T::shared_map(self).get(key)
    }

    /// Look up a per-participant variable by key and type.
    pub fn user<T: VarValue>(&self, key: &VarKey) -> Option<Arc<UserVar<T>>> {
        T::user_map(self).get(key)
    }

    /// All keys in the shared partition, sorted.
    pub fn shared_keys(&self) -> Vec<VarKey> {
        let mut keys: Vec<_> = self.shared_keys.lock().unwrap().iter().cloned().collect();
        keys.sort();
        keys
    }

    /// All keys in the per-participant partition, sorted.
    pub fn user_keys(&self) -> Vec<VarKey> {
        let mut keys: Vec<_> = self.user_keys.lock().unwrap().iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Record the local participant identity on every store.
    pub fn set_self(&self, id: ParticipantId) {
        set_self_shared(&self.shared_bools, id);
        set_self_shared(&self.shared_floats, id);
        set_self_shared(&self.shared_ints, id);
        set_self_shared(&self.shared_strings, id);
        set_self_user(&self.user_bools, id);
        set_self_user(&self.user_floats, id);
        set_self_user(&self.user_ints, id);
        set_self_user(&self.user_strings, id);
    }

    /// Seed a slot for a newly observed participant on every
    /// per-participant store.
    pub fn observe_participant(&self, participant: ParticipantId) {
        observe_user(&self.user_bools, participant);
        observe_user(&self.user_floats, participant);
        observe_user(&self.user_ints, participant);
        observe_user(&self.user_strings, participant);
    }

    /// Flip host authority on every store in both partitions.
    ///
    /// Called only by the host migrator, under the match dispatch lock, so
    /// no inbound unit ever sees a mix of authority flags.
    pub(crate) fn set_is_host(&self, is_host: bool) {
        set_host_shared(&self.shared_bools, is_host);
        set_host_shared(&self.shared_floats, is_host);
        set_host_shared(&self.shared_ints, is_host);
        set_host_shared(&self.shared_strings, is_host);
        set_host_user(&self.user_bools, is_host);
        set_host_user(&self.user_floats, is_host);
        set_host_user(&self.user_ints, is_host);
        set_host_user(&self.user_strings, is_host);
    }

    /// Reset every store. Used only at match teardown.
    pub fn reset(&self) {
        reset_shared(&self.shared_bools);
        reset_shared(&self.shared_floats);
        reset_shared(&self.shared_ints);
        reset_shared(&self.shared_strings);
        reset_user(&self.user_bools);
        reset_user(&self.user_floats);
        reset_user(&self.user_ints);
        reset_user(&self.user_strings);
    }
}

fn set_self_shared<T>(map: &VarMap<SharedVar<T>>, id: ParticipantId) {
    for (_, var) in map.entries() {
        var.set_self(id);
    }
}

fn set_self_user<T>(map: &VarMap<UserVar<T>>, id: ParticipantId) {
    for (_, var) in map.entries() {
        var.set_self(id);
    }
}

fn observe_user<T>(map: &VarMap<UserVar<T>>, participant: ParticipantId) {
    for (_, var) in map.entries() {
        var.observe(participant);
    }
}

fn set_host_shared<T>(map: &VarMap<SharedVar<T>>, is_host: bool) {
    for (_, var) in map.entries() {
        var.set_is_host(is_host);
    }
}

fn set_host_user<T>(map: &VarMap<UserVar<T>>, is_host: bool) {
    for (_, var) in map.entries() {
        var.set_is_host(is_host);
    }
}

fn reset_shared<T>(map: &VarMap<SharedVar<T>>) {
    for (_, var) in map.entries() {
        var.reset();
    }
}

fn reset_user<T>(map: &VarMap<UserVar<T>>) {
    for (_, var) in map.entries() {
        var.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_shared_key_is_rejected() {
        let registry = VarRegistry::new();
        registry
            .register_shared("score", Arc::new(SharedVar::<i64>::new()))
            .unwrap();

        let err = registry
            .register_shared("score", Arc::new(SharedVar::<i64>::new()))
            .unwrap_err();
        assert!(matches!(err, SyncError::DuplicateKey { .. }));
    }

    #[test]
    fn duplicate_key_across_types_is_rejected_within_a_partition() {
        let registry = VarRegistry::new();
        registry
            .register_shared("flag", Arc::new(SharedVar::<bool>::new()))
            .unwrap();

        // Same key, different value type, same partition: still a duplicate.
        let err = registry
            .register_shared("flag", Arc::new(SharedVar::<String>::new()))
            .unwrap_err();
        assert!(matches!(err, SyncError::DuplicateKey { .. }));
    }

    #[test]
    fn shared_and_user_namespaces_are_disjoint() {
        let registry = VarRegistry::new();
        registry
            .register_shared("energy", Arc::new(SharedVar::<f64>::new()))
            .unwrap();
        registry
            .register_user("energy", Arc::new(UserVar::<f64>::new()))
            .unwrap();

        assert!(registry.shared::<f64>(&VarKey::from("energy")).is_some());
        assert!(registry.user::<f64>(&VarKey::from("energy")).is_some());
    }

    #[test]
    fn lookup_by_wrong_type_yields_none() {
        let registry = VarRegistry::new();
        registry
            .register_shared("score", Arc::new(SharedVar::<i64>::new()))
            .unwrap();

        assert!(registry.shared::<bool>(&VarKey::from("score")).is_none());
        assert!(registry.shared::<i64>(&VarKey::from("score")).is_some());
    }

    #[test]
    fn key_lists_are_sorted_and_complete() {
        let registry = VarRegistry::new();
        registry
            .register_shared("zeta", Arc::new(SharedVar::<bool>::new()))
            .unwrap();
        registry
            .register_shared("alpha", Arc::new(SharedVar::<i64>::new()))
            .unwrap();
        registry
            .register_user("stamina", Arc::new(UserVar::<f64>::new()))
            .unwrap();

        assert_eq!(
            registry.shared_keys(),
            vec![VarKey::from("alpha"), VarKey::from("zeta")]
        );
        assert_eq!(registry.user_keys(), vec![VarKey::from("stamina")]);
    }

    #[test]
    fn observe_participant_seeds_all_user_vars() {
        let registry = VarRegistry::new();
        let stamina = Arc::new(UserVar::<f64>::new());
        let name = Arc::new(UserVar::<String>::new());
        registry.register_user("stamina", stamina.clone()).unwrap();
        registry.register_user("name", name.clone()).unwrap();

        let p = ParticipantId::random();
        registry.observe_participant(p);

        assert_eq!(stamina.get(&p).unwrap(), None);
        assert_eq!(name.get(&p).unwrap(), None);
    }

    #[test]
    fn set_is_host_covers_both_partitions() {
        let registry = VarRegistry::new();
        let shared = Arc::new(SharedVar::<i64>::new());
        let user = Arc::new(UserVar::<String>::new());
        registry.register_shared("score", shared.clone()).unwrap();
        registry.register_user("name", user.clone()).unwrap();

        registry.set_is_host(true);
        assert!(shared.is_host());
        assert!(user.is_host());

        registry.set_is_host(false);
        assert!(!shared.is_host());
        assert!(!user.is_host());
    }
}
