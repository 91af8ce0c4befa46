//! # drift_replication
//!
//! Decides what subset of server-side world state each client needs,
//! packages it into typed packets, and reconstructs consistent client-side
//! state from a stream of partial, possibly-reordered updates.
//!
//! This crate provides:
//!
//! - [`tagger`] — marks entities/components dirty for the planner.
//! - [`planner`] — per-peer snapshot classification and payload building.
//! - [`deletions`] — the DeletedEntity ledger, retained until acknowledged.
//! - [`session`] — the per-peer replication state machine.
//! - [`endpoint`] — the connect/disconnect/data capability both sides
//!   implement.
//! - [`server`] / [`client`] — the two concrete endpoints.

pub mod client;
pub mod deletions;
pub mod endpoint;
pub mod error;
pub mod planner;
pub mod server;
pub mod session;
pub mod tagger;

pub use client::{ClientEvent, ReplicationClient};
pub use deletions::{DeletedEntity, DeletionLedger};
pub use endpoint::{Endpoint, pump};
pub use error::ReplicationError;
pub use planner::SnapshotType;
pub use server::{ReplicationServer, ServerEvent};
pub use session::{ReplicationSession, SessionState};
