//! The sync envelope - one inbound/outbound unit of replication traffic.
//!
//! An envelope carries, per primitive type, the shared-variable entries,
//! per-participant entries, acknowledgement key lists and version conflicts
//! accumulated for a single transmission. Empty buckets are skipped on the
//! wire.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{KeyedConflict, SharedValue, UserValue, VarKey};

/// One unit of synchronization traffic.
///
/// Buckets are partitioned first by shared vs per-participant, then by the
/// four primitive value types. Acknowledgements are bare key lists meaning
/// "this value is now confirmed valid".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncEnvelope {
    /// Shared bool entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_bools: Vec<SharedValue<bool>>,
    /// Shared float entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_floats: Vec<SharedValue<f64>>,
    /// Shared int entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_ints: Vec<SharedValue<i64>>,
    /// Shared string entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_strings: Vec<SharedValue<String>>,

    /// Per-participant bool entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_bools: Vec<UserValue<bool>>,
    /// Per-participant float entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_floats: Vec<UserValue<f64>>,
    /// Per-participant int entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_ints: Vec<UserValue<i64>>,
    /// Per-participant string entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_strings: Vec<UserValue<String>>,

    /// Acknowledged shared bool keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_bool_acks: Vec<VarKey>,
    /// Acknowledged shared float keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_float_acks: Vec<VarKey>,
    /// Acknowledged shared int keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_int_acks: Vec<VarKey>,
    /// Acknowledged shared string keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_string_acks: Vec<VarKey>,

    /// Acknowledged per-participant bool keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_bool_acks: Vec<VarKey>,
    /// Acknowledged per-participant float keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_float_acks: Vec<VarKey>,
    /// Acknowledged per-participant int keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_int_acks: Vec<VarKey>,
    /// Acknowledged per-participant string keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_string_acks: Vec<VarKey>,

    /// Shared bool conflicts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_bool_conflicts: Vec<KeyedConflict<bool>>,
    /// Shared float conflicts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_float_conflicts: Vec<KeyedConflict<f64>>,
    /// Shared int conflicts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_int_conflicts: Vec<KeyedConflict<i64>>,
    /// Shared string conflicts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_string_conflicts: Vec<KeyedConflict<String>>,

    /// Per-participant bool conflicts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_bool_conflicts: Vec<KeyedConflict<bool>>,
    /// Per-participant float conflicts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_float_conflicts: Vec<KeyedConflict<f64>>,
    /// Per-participant int conflicts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_int_conflicts: Vec<KeyedConflict<i64>>,
    /// Per-participant string conflicts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_string_conflicts: Vec<KeyedConflict<String>>,
}

impl SyncEnvelope {
    /// Create an empty envelope.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when every bucket is empty; an empty envelope must never be sent.
    pub fn is_empty(&self) -> bool {
        self.shared_bools.is_empty()
            && self.shared_floats.is_empty()
            && self.shared_ints.is_empty()
            && self.shared_strings.is_empty()
            && self.user_bools.is_empty()
            && self.user_floats.is_empty()
            && self.user_ints.is_empty()
            && self.user_strings.is_empty()
            && self.shared_bool_acks.is_empty()
            && self.shared_float_acks.is_empty()
            && self.shared_int_acks.is_empty()
            && self.shared_string_acks.is_empty()
            && self.user_bool_acks.is_empty()
            && self.user_float_acks.is_empty()
            && self.user_int_acks.is_empty()
            && self.user_string_acks.is_empty()
            && self.shared_bool_conflicts.is_empty()
            && self.shared_float_conflicts.is_empty()
            && self.shared_int_conflicts.is_empty()
            && self.shared_string_conflicts.is_empty()
            && self.user_bool_conflicts.is_empty()
            && self.user_float_conflicts.is_empty()
            && self.user_int_conflicts.is_empty()
            && self.user_string_conflicts.is_empty()
    }
}

/// Bucket access for the four primitive value types.
///
/// Each synchronized type knows which envelope buckets carry its entries,
/// acknowledgements and conflicts, so ingress and migration code can be
/// written once and instantiated per type.
pub trait WireValue:
    Clone + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Shared-variable entries for this type.
    fn shared_values(env: &SyncEnvelope) -> &[SharedValue<Self>];
    /// Mutable shared-variable entries for this type.
    fn shared_values_mut(env: &mut SyncEnvelope) -> &mut Vec<SharedValue<Self>>;
    /// Per-participant entries for this type.
    fn user_values(env: &SyncEnvelope) -> &[UserValue<Self>];
    /// Mutable per-participant entries for this type.
    fn user_values_mut(env: &mut SyncEnvelope) -> &mut Vec<UserValue<Self>>;
    /// Acknowledged shared keys for this type.
    fn shared_acks(env: &SyncEnvelope) -> &[VarKey];
    /// Mutable acknowledged shared keys for this type.
    fn shared_acks_mut(env: &mut SyncEnvelope) -> &mut Vec<VarKey>;
    /// Acknowledged per-participant keys for this type.
    fn user_acks(env: &SyncEnvelope) -> &[VarKey];
    /// Mutable acknowledged per-participant keys for this type.
    fn user_acks_mut(env: &mut SyncEnvelope) -> &mut Vec<VarKey>;
    /// Shared-variable conflicts for this type.
    fn shared_conflicts(env: &SyncEnvelope) -> &[KeyedConflict<Self>];
    /// Mutable shared-variable conflicts for this type.
    fn shared_conflicts_mut(env: &mut SyncEnvelope) -> &mut Vec<KeyedConflict<Self>>;
    /// Per-participant conflicts for this type.
    fn user_conflicts(env: &SyncEnvelope) -> &[KeyedConflict<Self>];
    /// Mutable per-participant conflicts for this type.
    fn user_conflicts_mut(env: &mut SyncEnvelope) -> &mut Vec<KeyedConflict<Self>>;
}

macro_rules! impl_wire_value {
    ($ty:ty, $sv:ident, $uv:ident, $sa:ident, $ua:ident, $sc:ident, $uc:ident) => {
        impl WireValue for $ty {
            fn shared_values(env: &SyncEnvelope) -> &[SharedValue<Self>] {
                &env.$sv
            }
            fn shared_values_mut(env: &mut SyncEnvelope) -> &mut Vec<SharedValue<Self>> {
                &mut env.$sv
            }
            fn user_values(env: &SyncEnvelope) -> &[UserValue<Self>] {
                &env.$uv
            }
            fn user_values_mut(env: &mut SyncEnvelope) -> &mut Vec<UserValue<Self>> {
                &mut env.$uv
            }
            fn shared_acks(env: &SyncEnvelope) -> &[VarKey] {
                &env.$sa
            }
            fn shared_acks_mut(env: &mut SyncEnvelope) -> &mut Vec<VarKey> {
                &mut env.$sa
            }
            fn user_acks(env: &SyncEnvelope) -> &[VarKey] {
                &env.$ua
            }
            fn user_acks_mut(env: &mut SyncEnvelope) -> &mut Vec<VarKey> {
                &mut env.$ua
            }
            fn shared_conflicts(env: &SyncEnvelope) -> &[KeyedConflict<Self>] {
                &env.$sc
            }
            fn shared_conflicts_mut(env: &mut SyncEnvelope) -> &mut Vec<KeyedConflict<Self>> {
                &mut env.$sc
            }
            fn user_conflicts(env: &SyncEnvelope) -> &[KeyedConflict<Self>] {
                &env.$uc
            }
            fn user_conflicts_mut(env: &mut SyncEnvelope) -> &mut Vec<KeyedConflict<Self>> {
                &mut env.$uc
            }
        }
    };
}

impl_wire_value!(
    bool,
    shared_bools,
    user_bools,
    shared_bool_acks,
    user_bool_acks,
    shared_bool_conflicts,
    user_bool_conflicts
);
impl_wire_value!(
    f64,
    shared_floats,
    user_floats,
    shared_float_acks,
    user_float_acks,
    shared_float_conflicts,
    user_float_conflicts
);
impl_wire_value!(
    i64,
    shared_ints,
    user_ints,
    shared_int_acks,
    user_int_acks,
    shared_int_conflicts,
    user_int_conflicts
);
impl_wire_value!(
    String,
    shared_strings,
    user_strings,
    shared_string_acks,
    user_string_acks,
    shared_string_conflicts,
    user_string_conflicts
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValidationStatus;

    #[test]
    fn new_envelope_is_empty() {
        assert!(SyncEnvelope::new().is_empty());
    }

    #[test]
    fn any_bucket_makes_envelope_non_empty() {
        let mut env = SyncEnvelope::new();
        env.user_string_acks.push(VarKey::from("name"));
        assert!(!env.is_empty());
    }

    #[test]
    fn empty_buckets_are_skipped_on_the_wire() {
        let mut env = SyncEnvelope::new();
        env.shared_ints.push(SharedValue {
            key: VarKey::from("score"),
            value: 10,
            lock_version: 2,
            status: ValidationStatus::Validated,
        });

        let json = serde_json::to_value(&env).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 1, "only the populated bucket should serialize");
        assert!(obj.contains_key("shared_ints"));
    }

    #[test]
    fn bucket_accessors_select_the_right_partition() {
        let mut env = SyncEnvelope::new();
        <i64 as WireValue>::shared_acks_mut(&mut env).push(VarKey::from("score"));
        <i64 as WireValue>::user_acks_mut(&mut env).push(VarKey::from("stamina"));

        assert_eq!(env.shared_int_acks, vec![VarKey::from("score")]);
        assert_eq!(env.user_int_acks, vec![VarKey::from("stamina")]);
        assert!(env.shared_bool_acks.is_empty());
    }

    #[test]
    fn envelope_roundtrip_preserves_typed_buckets() {
        let mut env = SyncEnvelope::new();
        env.shared_floats.push(SharedValue {
            key: VarKey::from("speed"),
            value: 1.5,
            lock_version: 1,
            status: ValidationStatus::Unvalidated,
        });
        env.shared_bool_acks.push(VarKey::from("ready"));

        // Named encoding, as used by SyncMessage::to_bytes: skipped empty
        // buckets come back as defaults.
        let bytes = rmp_serde::to_vec_named(&env).unwrap();
        let restored: SyncEnvelope = rmp_serde::from_slice(&bytes).unwrap();

        assert_eq!(env, restored);
    }
}
