//! SyncMatch - the per-match entry point for variable replication.
//!
//! This module provides [`SyncMatch`], the surface the embedding
//! application talks to. It owns the transport and a registry of variable
//! stores, and routes every inbound frame and lifecycle notification
//! through the pure logic in `varsync-core`.
//!
//! # Architecture
//!
//! ```text
//! Application → SyncMatch → MatchTransport → Network
//!                  ↓
//!            varsync-core (pure, no I/O)
//! ```
//!
//! # Concurrency
//!
//! A single async mutex per match serializes inbound dispatch, local
//! writes, host migration and presence updates. Every unit of work runs to
//! completion under that lock, including its outbound sends, so the
//! ordering the arbitration logic assumes is enforced in exactly one
//! place.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use sync_core::{
    check_handshake, handshake_request, migrator, receive_envelope, snapshot, EnvelopeBuilder,
    MigrationOutcome, Role, VarRegistry, VarValue,
};
use sync_types::{
    HandshakeReply, ParticipantId, SharedValue, SyncEnvelope, SyncError, SyncMessage,
    UserValue, ValidationStatus, VarKey,
};

use crate::transport::{MatchTransport, TransportError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol-level error (encoding, registration, handshake contents).
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// No host is currently elected; the caller may retry after the next
    /// host-change notification.
    #[error("no host elected for the match")]
    NoHost,

    /// The key is not registered in the relevant partition.
    #[error("variable {key} is not registered")]
    UnknownVariable {
        /// The key that was looked up.
        key: VarKey,
    },

    /// The host refused our handshake; this match will not replicate.
    #[error("the host rejected our handshake")]
    HandshakeRejected,
}

struct MatchInner {
    role: Role,
    host: Option<ParticipantId>,
    participants: HashSet<ParticipantId>,
    blocked: HashSet<ParticipantId>,
    builder: EnvelopeBuilder,
}

/// One synchronized match.
///
/// Owns the transport and the variable registry for the lifetime of the
/// match. The embedding application forwards inbound frames to
/// [`handle_message`](SyncMatch::handle_message) and lifecycle events to
/// the `participant_*` / [`host_changed`](SyncMatch::host_changed)
/// methods; local writes go through [`set_shared`](SyncMatch::set_shared)
/// and [`set_user`](SyncMatch::set_user).
pub struct SyncMatch<T: MatchTransport> {
    self_id: ParticipantId,
    registry: Arc<VarRegistry>,
    transport: T,
    inner: Mutex<MatchInner>,
}

impl<T: MatchTransport> SyncMatch<T> {
    /// Create a match around an already-populated registry.
    ///
    /// Registration must be complete before this point: the key-space is
    /// advertised during the handshake and never renegotiated.
    pub fn new(self_id: ParticipantId, registry: Arc<VarRegistry>, transport: T) -> Self {
        registry.set_self(self_id);
        Self {
            self_id,
            registry,
            transport,
            inner: Mutex::new(MatchInner {
                role: Role::Guest,
                host: None,
                participants: HashSet::new(),
                blocked: HashSet::new(),
                builder: EnvelopeBuilder::new(),
            }),
        }
    }

    /// The local participant identity.
    pub fn self_id(&self) -> ParticipantId {
        self.self_id
    }

    /// The registry backing this match.
    pub fn registry(&self) -> &Arc<VarRegistry> {
        &self.registry
    }

    /// Whether this process currently holds host authority.
    pub async fn is_host(&self) -> bool {
        self.inner.lock().await.role == Role::Host
    }

    /// The currently elected host, if any.
    pub async fn host(&self) -> Option<ParticipantId> {
        self.inner.lock().await.host
    }

    /// Process one inbound frame from `source`.
    ///
    /// Frames from blocked participants are dropped. Everything else is
    /// decoded and dispatched under the match lock; a host additionally
    /// sends whatever the dispatch produced before the lock is released.
    pub async fn handle_message(
        &self,
        source: ParticipantId,
        bytes: &[u8],
    ) -> Result<(), ClientError> {
        let message = SyncMessage::from_bytes(bytes)?;
        let mut inner = self.inner.lock().await;

        if inner.blocked.contains(&source) {
            warn!(%source, "dropping frame from blocked participant");
            return Ok(());
        }

        match message {
            SyncMessage::Handshake(request) => {
                if inner.role != Role::Host {
                    debug!(%source, "ignoring handshake, not the host");
                    return Ok(());
                }
                match check_handshake(&self.registry, &request) {
                    Ok(()) => {
                        info!(%source, "handshake accepted");
                        let reply = HandshakeReply {
                            accepted: true,
                            state: Some(snapshot(&self.registry)),
                        };
                        self.send_to(source, SyncMessage::HandshakeReply(reply))
                            .await?;
                    }
                    Err(err) => {
                        warn!(%source, %err, "handshake mismatch, blocking participant");
                        inner.blocked.insert(source);
                        let reply = HandshakeReply {
                            accepted: false,
                            state: None,
                        };
                        self.send_to(source, SyncMessage::HandshakeReply(reply))
                            .await?;
                    }
                }
                Ok(())
            }
            SyncMessage::HandshakeReply(reply) => {
                if !reply.accepted {
                    warn!(%source, "host rejected our handshake");
                    return Err(ClientError::HandshakeRejected);
                }
                if let Some(state) = reply.state {
                    // The snapshot is ordinary host-approved traffic.
                    receive_envelope(
                        &self.registry,
                        self.self_id,
                        source,
                        &state,
                        Role::Guest,
                        &mut inner.builder,
                    );
                }
                info!(%source, "handshake accepted by host");
                Ok(())
            }
            SyncMessage::Envelope(envelope) => {
                let role = inner.role;
                let conflicts = receive_envelope(
                    &self.registry,
                    self.self_id,
                    source,
                    &envelope,
                    role,
                    &mut inner.builder,
                );
                if role == Role::Host {
                    if let Some(conflicts) = conflicts {
                        debug!(%source, "delivering version conflicts to the losing writer");
                        self.send_to(source, SyncMessage::Envelope(conflicts))
                            .await?;
                    }
                    self.flush(&mut inner).await?;
                }
                Ok(())
            }
        }
    }

    /// Advertise our key-space to the current host.
    ///
    /// Called by a joining guest once the match has told it who the host
    /// is. The host itself never handshakes.
    pub async fn handshake(&self) -> Result<(), ClientError> {
        let inner = self.inner.lock().await;
        let host = inner.host.ok_or(ClientError::NoHost)?;
        if host == self.self_id {
            return Ok(());
        }
        debug!(%host, "advertising key-space to host");
        let request = handshake_request(&self.registry);
        self.send_to(host, SyncMessage::Handshake(request)).await
    }

    /// React to a host change delivered by the match infrastructure.
    ///
    /// On promotion the acknowledgement sweep goes out as exactly one
    /// broadcast before this method returns, so no later write can
    /// interleave with it.
    pub async fn host_changed(
        &self,
        old_host: Option<ParticipantId>,
        new_host: Option<ParticipantId>,
    ) -> Result<MigrationOutcome, ClientError> {
        let mut inner = self.inner.lock().await;
        inner.host = new_host;

        let outcome = migrator::handle_host_changed(
            &self.registry,
            &mut inner.builder,
            self.self_id,
            old_host,
            new_host,
        );
        match outcome {
            MigrationOutcome::BecameHost => {
                inner.role = Role::Host;
                info!("promoted to host");
                self.flush(&mut inner).await?;
            }
            MigrationOutcome::LostHost => {
                inner.role = Role::Guest;
                info!(new_host = ?new_host, "demoted to guest");
            }
            MigrationOutcome::Unrelated => {
                debug!(new_host = ?new_host, "host changed between other participants");
            }
        }
        Ok(outcome)
    }

    /// Record a participant joining the match.
    ///
    /// Seeds an empty slot on every per-participant store so reads for the
    /// newcomer distinguish "no value yet" from "never present".
    pub async fn participant_joined(&self, participant: ParticipantId) {
        let mut inner = self.inner.lock().await;
        inner.participants.insert(participant);
        self.registry.observe_participant(participant);
        debug!(%participant, "participant joined");
    }

    /// Record a participant leaving the match.
    pub async fn participant_left(&self, participant: ParticipantId) {
        let mut inner = self.inner.lock().await;
        inner.participants.remove(&participant);
        inner.blocked.remove(&participant);
        debug!(%participant, "participant left");
    }

    /// Write a shared variable.
    ///
    /// As host the write is validated and broadcast immediately. As guest
    /// it is applied optimistically at the current lock version and
    /// forwarded to the host for arbitration; the key stays unvalidated
    /// until the host's broadcast or acknowledgement comes back. Writing a
    /// value equal to the current one transmits nothing.
    pub async fn set_shared<V: VarValue>(
        &self,
        key: impl Into<VarKey>,
        value: V,
    ) -> Result<(), ClientError> {
        let key = key.into();
        let mut inner = self.inner.lock().await;
        let var = self
            .registry
            .shared::<V>(&key)
            .ok_or_else(|| ClientError::UnknownVariable { key: key.clone() })?;

        match inner.role {
            Role::Host => {
                // Our own write never races anything under the match lock,
                // so acceptance is unconditional.
                let version = var.lock_version() + 1;
                if !var.set_local(
                    value.clone(),
                    self.self_id,
                    version,
                    ValidationStatus::Validated,
                ) {
                    return Ok(());
                }
                inner.builder.add_shared_value(SharedValue {
                    key,
                    value,
                    lock_version: version,
                    status: ValidationStatus::Validated,
                });
                self.flush(&mut inner).await
            }
            Role::Guest => {
                let host = inner.host.ok_or(ClientError::NoHost)?;
                let version = var.lock_version();
                if !var.set_local(
                    value.clone(),
                    self.self_id,
                    version,
                    ValidationStatus::Unvalidated,
                ) {
                    return Ok(());
                }
                let mut envelope = SyncEnvelope::new();
                V::shared_values_mut(&mut envelope).push(SharedValue {
                    key,
                    value,
                    lock_version: version,
                    status: ValidationStatus::Unvalidated,
                });
                self.send_to(host, SyncMessage::Envelope(envelope)).await
            }
        }
    }

    /// Write our own slot of a per-participant variable.
    ///
    /// Same validation flow as [`set_shared`](SyncMatch::set_shared); the
    /// slot written is always the local participant's.
    pub async fn set_user<V: VarValue>(
        &self,
        key: impl Into<VarKey>,
        value: V,
    ) -> Result<(), ClientError> {
        let key = key.into();
        let mut inner = self.inner.lock().await;
        let var = self
            .registry
            .user::<V>(&key)
            .ok_or_else(|| ClientError::UnknownVariable { key: key.clone() })?;

        match inner.role {
            Role::Host => {
                let version = var.lock_version() + 1;
                if !var.set_local(
                    value.clone(),
                    self.self_id,
                    self.self_id,
                    version,
                    ValidationStatus::Validated,
                ) {
                    return Ok(());
                }
                inner.builder.add_user_value(UserValue {
                    key,
                    target: self.self_id,
                    value,
                    lock_version: version,
                    status: ValidationStatus::Validated,
                });
                self.flush(&mut inner).await
            }
            Role::Guest => {
                let host = inner.host.ok_or(ClientError::NoHost)?;
                let version = var.lock_version();
                if !var.set_local(
                    value.clone(),
                    self.self_id,
                    self.self_id,
                    version,
                    ValidationStatus::Unvalidated,
                ) {
                    return Ok(());
                }
                let mut envelope = SyncEnvelope::new();
                V::user_values_mut(&mut envelope).push(UserValue {
                    key,
                    target: self.self_id,
                    value,
                    lock_version: version,
                    status: ValidationStatus::Unvalidated,
                });
                self.send_to(host, SyncMessage::Envelope(envelope)).await
            }
        }
    }

    /// Tear the match down: reset every store and close the transport.
    pub async fn close(&self) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        self.registry.reset();
        inner.role = Role::Guest;
        inner.host = None;
        inner.participants.clear();
        inner.blocked.clear();
        inner.builder = EnvelopeBuilder::new();
        self.transport.close().await?;
        Ok(())
    }

    /// Send whatever the builder accumulated as one broadcast, if anything.
    async fn flush(&self, inner: &mut MatchInner) -> Result<(), ClientError> {
        if let Some(envelope) = inner.builder.take() {
            let bytes = SyncMessage::Envelope(envelope).to_bytes()?;
            self.transport.broadcast(&bytes).await?;
        }
        Ok(())
    }

    async fn send_to(
        &self,
        target: ParticipantId,
        message: SyncMessage,
    ) -> Result<(), ClientError> {
        let bytes = message.to_bytes()?;
        self.transport.send_to(&target, &bytes).await?;
        Ok(())
    }
}
