//! # drift_store
//!
//! The server-authoritative entity-component store and the dirty-tracking
//! tags that drive replication.
//!
//! This crate provides:
//!
//! - [`Entity`] — lightweight `u64` entity identifiers.
//! - [`EntityAllocator`] — monotonically increasing ID allocator.
//! - [`Component`] trait — the contract all replicated data must satisfy.
//! - [`Tag`] / [`TagSet`] — zero-size markers for replication bookkeeping.
//! - [`EntityStore`] — entity lifecycle, component attach/query, filtered
//!   iteration, and the apply-side registry client mirrors use to rebuild
//!   components from wire bytes.

pub mod component;
pub mod entity;
pub mod store;
pub mod tag;

pub use component::{Component, ComponentRecord, ComponentTypeId};
pub use entity::{Entity, EntityAllocator};
pub use store::{EntityStore, Filter, StoreError};
pub use tag::{Tag, TagSet};
