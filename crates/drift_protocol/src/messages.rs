//! Payload structs for every packet type.
//!
//! These are wire contracts, not internal representations: field order and
//! types must never change without a protocol version bump. All payloads
//! derive `Serialize`/`Deserialize` and travel as MessagePack behind the
//! one-byte packet type tag.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use drift_store::{ComponentRecord, Entity};

/// The protocol version carried in [`SetupSession`]. Bump on any wire
/// contract change.
pub const PROTOCOL_VERSION: u16 = 1;

// ── Control messages ────────────────────────────────────────────────────────

/// Liveness echo. Either side may send; the other echoes the nonce back.
/// Sent unreliable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Opaque value echoed back by the receiver.
    pub nonce: u64,
}

/// Free-form text: chat lines and server notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The text to display.
    pub text: String,
}

/// Client → server join request. The server answers a version mismatch with
/// a [`ChatMessage`] and leaves the peer in `Connecting`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupSession {
    /// Display name the client wants to join under.
    pub client_name: String,
    /// Must equal [`PROTOCOL_VERSION`].
    pub protocol_version: u16,
}

/// Server → client: which entity is this client's car.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarEntityId {
    /// The car entity in the replicated registry.
    pub entity: Entity,
}

/// One frame of car controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarInput {
    /// Accelerator, `0.0..=1.0`.
    pub throttle: f32,
    /// Brake, `0.0..=1.0`.
    pub brake: f32,
    /// Steering, `-1.0..=1.0` (negative is left).
    pub steering: f32,
    /// Handbrake engaged.
    pub handbrake: bool,
}

/// Client → server input sample. Sent unreliable, latest-wins; the tick
/// number lets the server drop samples that arrive out of order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClientInput {
    /// The client tick this sample was captured on.
    pub tick: u64,
    /// The controls.
    pub input: CarInput,
}

/// Client → server: the highest snapshot sequence applied so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotAck {
    /// The applied sequence number.
    pub sequence: u64,
}

/// Client → server: the incremental stream is broken (sequence gap or
/// repeated apply failures); a full resync is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesyncReport {
    /// The last sequence the client applied successfully.
    pub last_sequence: u64,
}

// ── Snapshot messages ───────────────────────────────────────────────────────

/// Directive attached to replication operations so application stays
/// idempotent under packet duplication and reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityOperationPolicy {
    /// The target must exist; a miss means the session has desynced.
    MustApplyOnce,
    /// Safe to skip when the target is already absent.
    SkipIfMissing,
}

/// One entity and its full component set, as shipped in entity-level
/// snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// The entity being described.
    pub entity: Entity,
    /// Every replicated component on it, sorted by type ID.
    pub components: Vec<ComponentRecord>,
}

/// Full-registry snapshot. Self-sufficient: applying one produces a correct
/// client state with no dependency on prior packets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceAllEntities {
    /// Session sequence number of this snapshot.
    pub sequence: u64,
    /// The entire replicated registry.
    pub entities: Vec<EntityRecord>,
}

/// Incremental snapshot announcing entities new since the last resync.
/// Valid only when applied in sequence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddNewEntities {
    /// Session sequence number of this snapshot.
    pub sequence: u64,
    /// The new entities with their full component sets.
    pub entities: Vec<EntityRecord>,
}

/// One changed component on one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentUpdate {
    /// The entity the component belongs to.
    pub entity: Entity,
    /// The changed component value.
    pub component: ComponentRecord,
    /// How the receiver treats a missing target.
    pub policy: EntityOperationPolicy,
}

/// Incremental snapshot carrying only changed components, not whole
/// entities. Valid only when applied in sequence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlyComponentUpdate {
    /// Session sequence number of this snapshot.
    pub sequence: u64,
    /// The changed components.
    pub updates: Vec<ComponentUpdate>,
}

/// Entities destroyed on the server that the receiving peer still knows
/// about. A missed deletion leaves a permanent ghost entity, so these are
/// sent reliable and retained until acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyedEntities {
    /// Session sequence number of this message.
    pub sequence: u64,
    /// The destroyed entity IDs.
    pub entities: Vec<Entity>,
    /// Always [`EntityOperationPolicy::SkipIfMissing`]: deleting an absent
    /// entity is a no-op, which makes duplicates harmless.
    pub policy: EntityOperationPolicy,
}

// ── Effects ─────────────────────────────────────────────────────────────────

/// Fire-and-forget particle effect (tyre smoke, sparks). Sent unreliable;
/// a lost one is never retransmitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnParticle {
    /// Emitter position in world space.
    pub position: Vec3,
    /// Initial particle velocity.
    pub velocity: Vec3,
    /// Number of particles to emit.
    pub count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_record_roundtrip() {
        use drift_store::{ComponentRecord, ComponentTypeId};

        let record = EntityRecord {
            entity: Entity::from_raw(7),
            components: vec![ComponentRecord {
                type_id: ComponentTypeId::from_name("Transform"),
                data: vec![1, 2, 3],
            }],
        };
        let bytes = rmp_serde::to_vec_named(&record).unwrap();
        let restored: EntityRecord = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(record, restored);
    }

    #[test]
    fn test_car_input_roundtrip() {
        let input = CarInput {
            throttle: 0.8,
            brake: 0.0,
            steering: -0.25,
            handbrake: false,
        };
        let bytes = rmp_serde::to_vec_named(&input).unwrap();
        let restored: CarInput = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(input, restored);
    }

    #[test]
    fn test_policy_roundtrip() {
        for policy in [
            EntityOperationPolicy::MustApplyOnce,
            EntityOperationPolicy::SkipIfMissing,
        ] {
            let bytes = rmp_serde::to_vec_named(&policy).unwrap();
            let restored: EntityOperationPolicy = rmp_serde::from_slice(&bytes).unwrap();
            assert_eq!(policy, restored);
        }
    }
}
