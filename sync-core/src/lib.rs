//! # varsync-core
//!
//! Pure synchronization logic for varsync (no I/O, instant tests).
//!
//! This crate implements the variable stores, registry, conflict
//! arbitration, ingress routing and host migration for match variable
//! synchronization, without any network I/O. The `varsync-client` crate
//! owns the transport and interprets what these modules accumulate.
//!
//! ## Design Philosophy
//!
//! Modules here mutate only in-memory stores and the [`EnvelopeBuilder`];
//! nothing blocks and nothing touches a socket. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic arbitration (same inputs, same verdicts)
//! - A single place (the client's dispatch lock) where ordering is decided

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod handshake;
pub mod ingress;
pub mod migrator;
pub mod registry;
pub mod resolver;
pub mod shared_var;
pub mod user_var;

pub use builder::EnvelopeBuilder;
pub use handshake::{check_handshake, handshake_request, snapshot};
pub use ingress::{receive_envelope, Role};
pub use migrator::{handle_host_changed, MigrationOutcome};
pub use registry::{VarMap, VarRegistry, VarValue};
pub use resolver::{resolve, WriteOutcome};
pub use shared_var::{SharedVar, SharedVarEvent};
pub use user_var::{UserVar, UserVarEvent};
