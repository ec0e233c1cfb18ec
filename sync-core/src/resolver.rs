//! Optimistic-concurrency arbitration, applied by the host only.
//!
//! A versioned write is accepted iff its declared version equals the key's
//! current lock version: a compare-and-swap keyed by version number. This is
//! what prevents lost updates under concurrent writers.

use sync_types::{VersionConflict, VersionedWrite};

/// The host's verdict on one versioned write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    /// The write won: store it at the bumped version and broadcast it.
    Accepted(VersionedWrite<T>),
    /// The write lost: deliver the conflict to the writer, and only to the
    /// writer.
    Rejected(VersionConflict<T>),
}

/// Arbitrate a write against the key's currently authoritative write.
///
/// `current` is `None` only while no write has ever been accepted for the
/// key; `current_version` is the key's lock version either way. On
/// acceptance the version advances by exactly 1. On rejection the conflict
/// pairs the losing write with what is actually stored; when nothing is
/// stored yet the conflict carries no accepted side, because no write ever
/// won.
pub fn resolve<T: Clone + PartialEq>(
    current: Option<VersionedWrite<T>>,
    current_version: u32,
    write: VersionedWrite<T>,
) -> WriteOutcome<T> {
    if write.version == current_version {
        return WriteOutcome::Accepted(VersionedWrite::new(
            write.value,
            current_version + 1,
            write.writer,
        ));
    }

    WriteOutcome::Rejected(VersionConflict {
        rejected: write,
        accepted: current,
    })
}
