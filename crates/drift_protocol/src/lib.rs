//! # drift_protocol
//!
//! The wire protocol of the drift replication core.
//!
//! This crate provides:
//!
//! - [`packet`] — [`PacketType`] tags and the typed [`Packet`] envelope.
//! - [`messages`] — payload structs for every packet type.
//! - [`codec`] — tag-first serialisation/deserialisation of packets.
//! - [`transport`] — the transport collaborator contract and the event
//!   queue that keeps entity mutation on the tick thread.
//! - [`memory`] — an in-process transport for tests and demos.
//! - [`error`] — protocol-layer error types.

pub mod codec;
pub mod error;
pub mod memory;
pub mod messages;
pub mod packet;
pub mod transport;

pub use codec::{decode, encode};
pub use error::{DecodeError, EncodeError, TransportError};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use messages::{
    AddNewEntities, CarEntityId, CarInput, ChatMessage, ClientInput, ComponentUpdate,
    DestroyedEntities, DesyncReport, EntityOperationPolicy, EntityRecord, OnlyComponentUpdate,
    PROTOCOL_VERSION, Ping, ReplaceAllEntities, SetupSession, SnapshotAck, SpawnParticle,
};
pub use packet::{Packet, PacketType};
pub use transport::{EventQueue, EventSender, PeerId, Transport, TransportEvent, event_queue};
