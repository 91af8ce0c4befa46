//! The mirror replication endpoint.
//!
//! [`ReplicationClient`] owns a mirror [`EntityStore`] rebuilt entirely
//! from server snapshots. It never allocates entity IDs; every entity it
//! holds was named by the server. Incremental snapshots are applied only
//! in exact sequence order; any gap or must-apply miss is reported as a
//! desync, after which the client waits for a fresh entire-registry
//! snapshot.

use tracing::{debug, info, warn};

use drift_protocol::{
    AddNewEntities, CarInput, ChatMessage, ClientInput, DestroyedEntities, DesyncReport,
    EntityOperationPolicy, EntityRecord, OnlyComponentUpdate, PROTOCOL_VERSION, Packet, PeerId,
    Ping, ReplaceAllEntities, SetupSession, SnapshotAck, SpawnParticle, Transport, decode, encode,
};
use drift_store::{Component, Entity, EntityStore, StoreError};

use crate::endpoint::Endpoint;
use crate::session::SessionState;

/// Gameplay-facing events produced by the client endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The transport reached the server.
    Connected(PeerId),
    /// The server is gone; the mirror is stale.
    Disconnected(PeerId),
    /// An entire-registry snapshot was applied; the mirror is authoritative
    /// again.
    FullSyncApplied {
        /// The snapshot's sequence number.
        sequence: u64,
    },
    /// The server named this client's car entity.
    CarAssigned(Entity),
    /// A chat line or server notice arrived.
    ChatReceived(String),
    /// A particle effect should play.
    ParticleSpawned(SpawnParticle),
    /// A ping came back.
    PongReceived {
        /// The nonce from the original ping.
        nonce: u64,
    },
}

/// The mirror endpoint: applies snapshots, reports progress and desyncs.
pub struct ReplicationClient<T: Transport> {
    transport: T,
    client_name: String,
    server: Option<PeerId>,
    state: SessionState,
    /// Highest snapshot sequence applied (0 = none yet).
    last_applied: u64,
    store: EntityStore,
    car_entity: Option<Entity>,
    events: Vec<ClientEvent>,
}

impl<T: Transport> ReplicationClient<T> {
    /// Create a client endpoint that will join as `client_name`.
    #[must_use]
    pub fn new(transport: T, client_name: impl Into<String>) -> Self {
        Self {
            transport,
            client_name: client_name.into(),
            server: None,
            state: SessionState::Connecting,
            last_applied: 0,
            store: EntityStore::new(),
            car_entity: None,
            events: Vec::new(),
        }
    }

    /// Register a replicated component type on the mirror.
    ///
    /// Must be called for every replicated type before connecting; the
    /// mirror only ever sees bytes and cannot infer types from them.
    pub fn register_component<C: Component>(&mut self) {
        self.store.register::<C>();
    }

    /// The mirror store.
    #[must_use]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// The entity the server assigned as this client's car.
    #[must_use]
    pub fn car_entity(&self) -> Option<Entity> {
        self.car_entity
    }

    /// Where this endpoint is in the replication lifecycle.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Highest snapshot sequence applied so far.
    #[must_use]
    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    /// Take the events accumulated since the last call.
    pub fn poll_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    /// Send one input sample, unreliable latest-wins.
    pub fn send_input(&mut self, tick: u64, input: CarInput) {
        self.send(&Packet::ClientInput(ClientInput { tick, input }));
    }

    /// Send a chat line.
    pub fn send_chat(&mut self, text: impl Into<String>) {
        self.send(&Packet::Message(ChatMessage { text: text.into() }));
    }

    /// Send a liveness ping; the server echoes the nonce back.
    pub fn send_ping(&mut self, nonce: u64) {
        self.send(&Packet::Ping(Ping { nonce }));
    }

    fn send(&mut self, packet: &Packet) {
        let Some(server) = self.server else {
            debug!(packet_type = ?packet.packet_type(), "dropping send, not connected");
            return;
        };
        let bytes = match encode(packet) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, packet_type = ?packet.packet_type(), "failed to encode packet");
                return;
            }
        };
        if let Err(error) = self.transport.send(server, bytes, packet.reliable()) {
            warn!(%server, %error, packet_type = ?packet.packet_type(), "failed to send packet");
        }
    }

    fn apply(&mut self, packet: Packet) {
        match packet {
            Packet::ReplaceAllEntities(snapshot) => self.apply_full_sync(snapshot),
            Packet::AddNewEntities(snapshot) => self.apply_new_entities(snapshot),
            Packet::OnlyComponentUpdate(snapshot) => self.apply_component_updates(snapshot),
            Packet::DestroyedEntities(message) => self.apply_destroyed(message),
            Packet::CarEntityId(message) => {
                info!(entity = %message.entity, "car assigned");
                self.car_entity = Some(message.entity);
                self.events.push(ClientEvent::CarAssigned(message.entity));
            }
            Packet::Message(message) => {
                self.events.push(ClientEvent::ChatReceived(message.text));
            }
            Packet::SpawnParticle(effect) => {
                self.events.push(ClientEvent::ParticleSpawned(effect));
            }
            Packet::Ping(ping) => {
                self.events.push(ClientEvent::PongReceived { nonce: ping.nonce });
            }
            other => {
                warn!(packet_type = ?other.packet_type(), "unexpected packet on client");
            }
        }
    }

    /// Rebuild the mirror from an entire-registry snapshot.
    ///
    /// Self-sufficient by contract: the store is cleared first, so the
    /// result depends on nothing applied before.
    fn apply_full_sync(&mut self, snapshot: ReplaceAllEntities) {
        if snapshot.sequence <= self.last_applied {
            debug!(
                sequence = snapshot.sequence,
                last_applied = self.last_applied,
                "ignoring stale full snapshot"
            );
            return;
        }
        info!(
            sequence = snapshot.sequence,
            entities = snapshot.entities.len(),
            "applying entire registry"
        );
        self.store.clear();
        self.car_entity = self
            .car_entity
            .filter(|car| snapshot.entities.iter().any(|r| r.entity == *car));
        for record in &snapshot.entities {
            self.insert_entity_record(record);
        }
        self.state = SessionState::Synced;
        self.mark_applied(snapshot.sequence);
        self.events.push(ClientEvent::FullSyncApplied {
            sequence: snapshot.sequence,
        });
    }

    fn apply_new_entities(&mut self, snapshot: AddNewEntities) {
        if !self.accept_sequence(snapshot.sequence) {
            return;
        }
        for record in &snapshot.entities {
            self.insert_entity_record(record);
        }
        self.mark_applied(snapshot.sequence);
    }

    fn insert_entity_record(&mut self, record: &EntityRecord) {
        match self.store.insert(record.entity) {
            Ok(()) => {}
            // Duplicate announcement: the component applies below refresh
            // the values, which keeps application idempotent.
            Err(StoreError::EntityExists(_)) => {}
            Err(error) => {
                warn!(entity = %record.entity, %error, "skipping entity record");
                return;
            }
        }
        for component in &record.components {
            if let Err(error) =
                self.store
                    .apply_component(record.entity, component.type_id, &component.data)
            {
                warn!(entity = %record.entity, %error, "skipping component record");
            }
        }
    }

    fn apply_component_updates(&mut self, snapshot: OnlyComponentUpdate) {
        if !self.accept_sequence(snapshot.sequence) {
            return;
        }
        for update in &snapshot.updates {
            match self
                .store
                .apply_component(update.entity, update.component.type_id, &update.component.data)
            {
                Ok(()) => {}
                Err(StoreError::EntityNotFound(_)) => match update.policy {
                    EntityOperationPolicy::SkipIfMissing => {
                        debug!(entity = %update.entity, "skipping update for absent entity");
                    }
                    EntityOperationPolicy::MustApplyOnce => {
                        // The server thinks this entity exists here. The
                        // mirror has drifted; no ack for this sequence.
                        self.report_desync();
                        return;
                    }
                },
                Err(error @ StoreError::UnknownComponentType(_)) => {
                    warn!(entity = %update.entity, %error, "skipping unknown component type");
                }
                Err(error) => {
                    warn!(entity = %update.entity, %error, "skipping component update");
                }
            }
        }
        self.mark_applied(snapshot.sequence);
    }

    fn apply_destroyed(&mut self, message: DestroyedEntities) {
        if !self.accept_sequence(message.sequence) {
            return;
        }
        for &entity in &message.entities {
            match self.store.destroy(entity) {
                Ok(()) => {
                    if self.car_entity == Some(entity) {
                        self.car_entity = None;
                    }
                }
                Err(StoreError::EntityNotFound(_)) => {
                    // Deleting an absent entity is a no-op under
                    // SkipIfMissing; the server also deletes entities this
                    // mirror never learned about.
                    debug!(%entity, "destroy for absent entity");
                }
                Err(error) => {
                    warn!(%entity, %error, "failed to destroy entity");
                }
            }
        }
        // The mirror has no downstream replication pass.
        self.store.take_destroyed();
        self.mark_applied(message.sequence);
    }

    /// Gate an incremental snapshot on exact sequence order.
    fn accept_sequence(&mut self, sequence: u64) -> bool {
        if sequence <= self.last_applied {
            debug!(sequence, last_applied = self.last_applied, "dropping duplicate snapshot");
            return false;
        }
        if self.state != SessionState::Synced {
            debug!(sequence, state = ?self.state, "dropping incremental snapshot, not synced");
            return false;
        }
        if sequence != self.last_applied + 1 {
            warn!(
                sequence,
                expected = self.last_applied + 1,
                "sequence gap in incremental stream"
            );
            self.report_desync();
            return false;
        }
        true
    }

    fn mark_applied(&mut self, sequence: u64) {
        self.last_applied = sequence;
        self.send(&Packet::SnapshotAck(SnapshotAck { sequence }));
    }

    /// Declare the mirror broken and ask for a fresh entire-registry
    /// snapshot. The connection stays up.
    fn report_desync(&mut self) {
        if self.state == SessionState::Desynced {
            return;
        }
        warn!(last_applied = self.last_applied, "mirror desynced, requesting full resync");
        self.state = SessionState::Desynced;
        self.send(&Packet::DesyncReport(DesyncReport {
            last_sequence: self.last_applied,
        }));
    }
}

impl<T: Transport> Endpoint for ReplicationClient<T> {
    fn on_connect(&mut self, peer: PeerId) {
        info!(%peer, client_name = %self.client_name, "connected to server");
        self.server = Some(peer);
        self.state = SessionState::AwaitingFullSync;
        let setup = Packet::SetupSession(SetupSession {
            client_name: self.client_name.clone(),
            protocol_version: PROTOCOL_VERSION,
        });
        self.send(&setup);
        self.events.push(ClientEvent::Connected(peer));
    }

    fn on_disconnect(&mut self, peer: PeerId) {
        if self.server != Some(peer) {
            return;
        }
        info!(%peer, "disconnected from server");
        self.server = None;
        self.state = SessionState::Connecting;
        self.last_applied = 0;
        self.car_entity = None;
        self.store.clear();
        self.events.push(ClientEvent::Disconnected(peer));
    }

    fn on_data(&mut self, peer: PeerId, bytes: &[u8]) {
        if self.server != Some(peer) {
            warn!(%peer, "dropping payload from unknown peer");
            return;
        }
        match decode(bytes) {
            Ok(packet) => self.apply(packet),
            Err(error) => {
                warn!(%peer, %error, len = bytes.len(), "dropping undecodable payload");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use drift_protocol::{CarEntityId, ComponentUpdate, TransportError};
    use drift_store::{ComponentRecord, ComponentTypeId};
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Fuel {
        litres: f32,
    }

    impl Component for Fuel {
        fn type_name() -> &'static str {
            "Fuel"
        }
    }

    #[derive(Default)]
    struct SinkTransport {
        sent: Vec<(PeerId, Vec<u8>, bool)>,
    }

    impl Transport for SinkTransport {
        fn send(
            &mut self,
            peer: PeerId,
            bytes: Vec<u8>,
            reliable: bool,
        ) -> Result<(), TransportError> {
            self.sent.push((peer, bytes, reliable));
            Ok(())
        }
    }

    const SERVER: PeerId = PeerId(1);

    fn client() -> ReplicationClient<SinkTransport> {
        let mut client = ReplicationClient::new(SinkTransport::default(), "driver");
        client.register_component::<Fuel>();
        client.on_connect(SERVER);
        client
    }

    fn sent_packets(client: &ReplicationClient<SinkTransport>) -> Vec<Packet> {
        client
            .transport
            .sent
            .iter()
            .map(|(_, bytes, _)| decode(bytes).unwrap())
            .collect()
    }

    fn fuel_record(entity: Entity, litres: f32) -> EntityRecord {
        EntityRecord {
            entity,
            components: vec![ComponentRecord {
                type_id: ComponentTypeId::of::<Fuel>(),
                data: rmp_serde::to_vec_named(&Fuel { litres }).unwrap(),
            }],
        }
    }

    fn deliver(client: &mut ReplicationClient<SinkTransport>, packet: &Packet) {
        let bytes = encode(packet).unwrap();
        client.on_data(SERVER, &bytes);
    }

    #[test]
    fn test_connect_sends_setup() {
        let client = client();
        let packets = sent_packets(&client);
        assert_eq!(packets.len(), 1);
        match &packets[0] {
            Packet::SetupSession(setup) => {
                assert_eq!(setup.client_name, "driver");
                assert_eq!(setup.protocol_version, PROTOCOL_VERSION);
            }
            other => panic!("expected setup, got {other:?}"),
        }
        assert_eq!(client.state(), SessionState::AwaitingFullSync);
    }

    #[test]
    fn test_full_sync_rebuilds_and_acks() {
        let mut client = client();
        let e = Entity::from_raw(10);
        deliver(
            &mut client,
            &Packet::ReplaceAllEntities(ReplaceAllEntities {
                sequence: 1,
                entities: vec![fuel_record(e, 40.0)],
            }),
        );

        assert_eq!(client.state(), SessionState::Synced);
        assert_eq!(client.store().get::<Fuel>(e).unwrap().litres, 40.0);
        assert!(
            sent_packets(&client)
                .contains(&Packet::SnapshotAck(SnapshotAck { sequence: 1 }))
        );
        assert!(
            client
                .poll_events()
                .contains(&ClientEvent::FullSyncApplied { sequence: 1 })
        );
    }

    #[test]
    fn test_incremental_before_full_sync_is_dropped() {
        let mut client = client();
        deliver(
            &mut client,
            &Packet::OnlyComponentUpdate(OnlyComponentUpdate {
                sequence: 1,
                updates: vec![],
            }),
        );
        assert_eq!(client.state(), SessionState::AwaitingFullSync);
        assert_eq!(client.last_applied(), 0);
    }

    #[test]
    fn test_duplicate_incremental_is_idempotent() {
        let mut client = client();
        let e = Entity::from_raw(10);
        deliver(
            &mut client,
            &Packet::ReplaceAllEntities(ReplaceAllEntities {
                sequence: 1,
                entities: vec![],
            }),
        );
        let add = Packet::AddNewEntities(AddNewEntities {
            sequence: 2,
            entities: vec![fuel_record(e, 12.0)],
        });
        deliver(&mut client, &add);
        deliver(&mut client, &add);

        assert_eq!(client.state(), SessionState::Synced);
        assert_eq!(client.last_applied(), 2);
        assert_eq!(client.store().size(), 1);
        assert_eq!(client.store().get::<Fuel>(e).unwrap().litres, 12.0);
    }

    #[test]
    fn test_sequence_gap_reports_desync() {
        let mut client = client();
        deliver(
            &mut client,
            &Packet::ReplaceAllEntities(ReplaceAllEntities {
                sequence: 1,
                entities: vec![],
            }),
        );
        deliver(
            &mut client,
            &Packet::OnlyComponentUpdate(OnlyComponentUpdate {
                sequence: 3,
                updates: vec![],
            }),
        );

        assert_eq!(client.state(), SessionState::Desynced);
        assert!(
            sent_packets(&client)
                .contains(&Packet::DesyncReport(DesyncReport { last_sequence: 1 }))
        );
        assert_eq!(client.last_applied(), 1, "gapped snapshot was not applied");
    }

    #[test]
    fn test_must_apply_miss_reports_desync_without_ack() {
        let mut client = client();
        deliver(
            &mut client,
            &Packet::ReplaceAllEntities(ReplaceAllEntities {
                sequence: 1,
                entities: vec![],
            }),
        );
        deliver(
            &mut client,
            &Packet::OnlyComponentUpdate(OnlyComponentUpdate {
                sequence: 2,
                updates: vec![ComponentUpdate {
                    entity: Entity::from_raw(99),
                    component: ComponentRecord {
                        type_id: ComponentTypeId::of::<Fuel>(),
                        data: rmp_serde::to_vec_named(&Fuel { litres: 1.0 }).unwrap(),
                    },
                    policy: EntityOperationPolicy::MustApplyOnce,
                }],
            }),
        );

        assert_eq!(client.state(), SessionState::Desynced);
        assert_eq!(client.last_applied(), 1);
        assert!(
            !sent_packets(&client)
                .contains(&Packet::SnapshotAck(SnapshotAck { sequence: 2 }))
        );
    }

    #[test]
    fn test_destroy_absent_entity_is_tolerated() {
        let mut client = client();
        let e = Entity::from_raw(10);
        deliver(
            &mut client,
            &Packet::ReplaceAllEntities(ReplaceAllEntities {
                sequence: 1,
                entities: vec![fuel_record(e, 5.0)],
            }),
        );
        deliver(
            &mut client,
            &Packet::DestroyedEntities(DestroyedEntities {
                sequence: 2,
                entities: vec![e, Entity::from_raw(999)],
                policy: EntityOperationPolicy::SkipIfMissing,
            }),
        );

        assert_eq!(client.state(), SessionState::Synced);
        assert!(client.store().is_empty());
        assert_eq!(client.last_applied(), 2);
    }

    #[test]
    fn test_destroying_car_clears_assignment() {
        let mut client = client();
        let car = Entity::from_raw(10);
        deliver(
            &mut client,
            &Packet::ReplaceAllEntities(ReplaceAllEntities {
                sequence: 1,
                entities: vec![fuel_record(car, 5.0)],
            }),
        );
        deliver(&mut client, &Packet::CarEntityId(CarEntityId { entity: car }));
        assert_eq!(client.car_entity(), Some(car));

        deliver(
            &mut client,
            &Packet::DestroyedEntities(DestroyedEntities {
                sequence: 2,
                entities: vec![car],
                policy: EntityOperationPolicy::SkipIfMissing,
            }),
        );
        assert_eq!(client.car_entity(), None);
    }

    #[test]
    fn test_fresh_full_sync_recovers_from_desync() {
        let mut client = client();
        deliver(
            &mut client,
            &Packet::ReplaceAllEntities(ReplaceAllEntities {
                sequence: 1,
                entities: vec![],
            }),
        );
        deliver(
            &mut client,
            &Packet::OnlyComponentUpdate(OnlyComponentUpdate {
                sequence: 5,
                updates: vec![],
            }),
        );
        assert_eq!(client.state(), SessionState::Desynced);

        let e = Entity::from_raw(20);
        deliver(
            &mut client,
            &Packet::ReplaceAllEntities(ReplaceAllEntities {
                sequence: 6,
                entities: vec![fuel_record(e, 30.0)],
            }),
        );
        assert_eq!(client.state(), SessionState::Synced);
        assert_eq!(client.last_applied(), 6);
        assert_eq!(client.store().get::<Fuel>(e).unwrap().litres, 30.0);
    }

    #[test]
    fn test_disconnect_resets_mirror() {
        let mut client = client();
        let e = Entity::from_raw(10);
        deliver(
            &mut client,
            &Packet::ReplaceAllEntities(ReplaceAllEntities {
                sequence: 1,
                entities: vec![fuel_record(e, 5.0)],
            }),
        );
        client.on_disconnect(SERVER);

        assert_eq!(client.state(), SessionState::Connecting);
        assert!(client.store().is_empty());
        assert_eq!(client.last_applied(), 0);
        assert!(
            client
                .poll_events()
                .contains(&ClientEvent::Disconnected(SERVER))
        );
    }

    #[test]
    fn test_payload_from_unknown_peer_is_dropped() {
        let mut client = client();
        // Drop the connection event so only the foreign payload is judged.
        client.poll_events();
        let bytes = encode(&Packet::Message(ChatMessage {
            text: "hi".to_string(),
        }))
        .unwrap();
        client.on_data(PeerId(99), &bytes);
        assert!(client.poll_events().is_empty());
    }
}
