//! Packet type tags and the typed packet envelope.
//!
//! Every wire payload starts with a one-byte [`PacketType`] tag so a
//! receiver can dispatch before parsing the body. The tag values are a wire
//! contract: they never change, and retired values are never reassigned
//! (tag 10 is a retired slot).

use crate::messages::{
    AddNewEntities, CarEntityId, ChatMessage, ClientInput, DestroyedEntities, DesyncReport,
    OnlyComponentUpdate, Ping, ReplaceAllEntities, SetupSession, SnapshotAck, SpawnParticle,
};

/// The stable one-byte tag leading every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Reserved; never sent. Decoding it fails like any unknown tag.
    Unknown = 0,
    /// Liveness echo.
    Ping = 1,
    /// Chat line or server notice.
    Message = 2,
    /// Client join request.
    SetupSession = 3,
    /// Which entity is the client's car.
    CarEntityId = 4,
    /// A car input sample.
    ClientInput = 5,
    /// Full-registry snapshot.
    ReplaceAllEntities = 6,
    /// Changed-components-only snapshot.
    OnlyComponentUpdate = 7,
    /// New-entities-only snapshot.
    AddNewEntities = 8,
    /// Server-side entity deletions.
    DestroyedEntities = 9,
    /// Fire-and-forget particle effect.
    SpawnParticle = 11,
    /// Client acknowledgement of an applied snapshot sequence.
    SnapshotAck = 12,
    /// Client report that the incremental stream is broken.
    DesyncReport = 13,
}

impl PacketType {
    /// The wire tag byte.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Look up a packet type by its wire tag.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Unknown),
            1 => Some(Self::Ping),
            2 => Some(Self::Message),
            3 => Some(Self::SetupSession),
            4 => Some(Self::CarEntityId),
            5 => Some(Self::ClientInput),
            6 => Some(Self::ReplaceAllEntities),
            7 => Some(Self::OnlyComponentUpdate),
            8 => Some(Self::AddNewEntities),
            9 => Some(Self::DestroyedEntities),
            11 => Some(Self::SpawnParticle),
            12 => Some(Self::SnapshotAck),
            13 => Some(Self::DesyncReport),
            _ => None,
        }
    }
}

/// A decoded packet: one [`PacketType`] with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Liveness echo.
    Ping(Ping),
    /// Chat line or server notice.
    Message(ChatMessage),
    /// Client join request.
    SetupSession(SetupSession),
    /// Which entity is the client's car.
    CarEntityId(CarEntityId),
    /// A car input sample.
    ClientInput(ClientInput),
    /// Full-registry snapshot.
    ReplaceAllEntities(ReplaceAllEntities),
    /// Changed-components-only snapshot.
    OnlyComponentUpdate(OnlyComponentUpdate),
    /// New-entities-only snapshot.
    AddNewEntities(AddNewEntities),
    /// Server-side entity deletions.
    DestroyedEntities(DestroyedEntities),
    /// Fire-and-forget particle effect.
    SpawnParticle(SpawnParticle),
    /// Client acknowledgement of an applied snapshot sequence.
    SnapshotAck(SnapshotAck),
    /// Client report that the incremental stream is broken.
    DesyncReport(DesyncReport),
}

impl Packet {
    /// The type tag this packet encodes under.
    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        match self {
            Packet::Ping(_) => PacketType::Ping,
            Packet::Message(_) => PacketType::Message,
            Packet::SetupSession(_) => PacketType::SetupSession,
            Packet::CarEntityId(_) => PacketType::CarEntityId,
            Packet::ClientInput(_) => PacketType::ClientInput,
            Packet::ReplaceAllEntities(_) => PacketType::ReplaceAllEntities,
            Packet::OnlyComponentUpdate(_) => PacketType::OnlyComponentUpdate,
            Packet::AddNewEntities(_) => PacketType::AddNewEntities,
            Packet::DestroyedEntities(_) => PacketType::DestroyedEntities,
            Packet::SpawnParticle(_) => PacketType::SpawnParticle,
            Packet::SnapshotAck(_) => PacketType::SnapshotAck,
            Packet::DesyncReport(_) => PacketType::DesyncReport,
        }
    }

    /// Whether this packet goes out on the reliable channel.
    ///
    /// Snapshots, session setup, car assignment, chat and acks must arrive;
    /// pings, input samples and particles are latest-wins traffic where a
    /// retransmitted stale value is worse than a gap.
    #[must_use]
    pub const fn reliable(&self) -> bool {
        !matches!(
            self,
            Packet::Ping(_) | Packet::ClientInput(_) | Packet::SpawnParticle(_)
        )
    }
}
