//! The authoritative replication endpoint.
//!
//! [`ReplicationServer`] owns one session per connected peer and drives the
//! per-tick replication pass: drain destroyed entities into the deletion
//! ledger, build each incremental payload at most once, hand every session
//! the snapshot its state calls for, then clear the dirty tags and purge
//! acknowledged ledger records.
//!
//! Gameplay-relevant packets (inputs, chat, joins) are not handled here;
//! they surface as [`ServerEvent`]s for the game loop to consume.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use drift_protocol::{
    AddNewEntities, CarEntityId, CarInput, ChatMessage, DestroyedEntities, EntityOperationPolicy,
    OnlyComponentUpdate, PROTOCOL_VERSION, Packet, PeerId, Ping, ReplaceAllEntities, SetupSession,
    SpawnParticle, Transport, decode, encode,
};
use drift_store::{Entity, EntityStore, Tag};

use crate::deletions::DeletionLedger;
use crate::endpoint::Endpoint;
use crate::error::ReplicationError;
use crate::planner::{self, SnapshotType};
use crate::session::ReplicationSession;

/// Gameplay-facing events produced by the server endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A peer completed session setup under `name`.
    PeerJoined {
        /// The joined peer.
        peer: PeerId,
        /// The display name it joined under.
        name: String,
    },
    /// A peer disconnected; its session is gone.
    PeerLeft {
        /// The departed peer.
        peer: PeerId,
    },
    /// An input sample arrived. Latest-wins: the game loop keeps the sample
    /// with the highest tick per peer.
    InputReceived {
        /// The sending peer.
        peer: PeerId,
        /// The client tick the sample was captured on.
        tick: u64,
        /// The controls.
        input: CarInput,
    },
    /// A chat line arrived.
    ChatReceived {
        /// The sending peer.
        peer: PeerId,
        /// The chat text.
        text: String,
    },
}

/// The authoritative endpoint: one session per peer, one deletion ledger.
pub struct ReplicationServer<T: Transport> {
    transport: T,
    sessions: HashMap<PeerId, ReplicationSession>,
    ledger: DeletionLedger,
    /// Monotonic replication tick, advanced once per [`ReplicationServer::replicate`].
    ledger_tick: u64,
    /// Tick on which an incremental payload last consumed the dirty tags.
    /// A session whose full snapshot was built before this tick missed
    /// that payload and needs a fresh snapshot once it acks.
    last_dirty_tick: u64,
    events: Vec<ServerEvent>,
}

impl<T: Transport> ReplicationServer<T> {
    /// Create a server endpoint over `transport`.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            sessions: HashMap::new(),
            ledger: DeletionLedger::new(),
            ledger_tick: 0,
            last_dirty_tick: 0,
            events: Vec::new(),
        }
    }

    /// The session for `peer`, if connected.
    #[must_use]
    pub fn session(&self, peer: PeerId) -> Option<&ReplicationSession> {
        self.sessions.get(&peer)
    }

    /// Number of connected peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.sessions.len()
    }

    /// Retained deletion records, for observability.
    #[must_use]
    pub fn pending_deletions(&self) -> usize {
        self.ledger.len()
    }

    /// Take the events accumulated since the last call.
    pub fn poll_events(&mut self) -> Vec<ServerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Tell `peer` which entity is its car.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::UnknownPeer`] if the peer has no
    /// session, or the encode/transport failure otherwise.
    pub fn assign_car(&mut self, peer: PeerId, entity: Entity) -> Result<(), ReplicationError> {
        if !self.sessions.contains_key(&peer) {
            return Err(ReplicationError::UnknownPeer(peer));
        }
        info!(%peer, %entity, "assigning car");
        let packet = Packet::CarEntityId(CarEntityId { entity });
        let bytes = encode(&packet)?;
        self.transport.send(peer, bytes, packet.reliable())?;
        Ok(())
    }

    /// Send a chat line or server notice to every peer past session setup.
    pub fn broadcast_chat(&mut self, text: &str) {
        let peers: Vec<PeerId> = self
            .sessions
            .values()
            .filter(|s| s.client_name().is_some())
            .map(ReplicationSession::peer)
            .collect();
        for peer in peers {
            self.send(
                peer,
                &Packet::Message(ChatMessage {
                    text: text.to_string(),
                }),
            );
        }
    }

    /// Fire a particle effect at every synced peer. Unreliable; a lost one
    /// is gone.
    pub fn spawn_particle(&mut self, effect: SpawnParticle) {
        let peers: Vec<PeerId> = self
            .sessions
            .values()
            .filter(|s| s.is_synced())
            .map(ReplicationSession::peer)
            .collect();
        for peer in peers {
            self.send(peer, &Packet::SpawnParticle(effect));
        }
    }

    /// Run one replication pass over `store`.
    ///
    /// Destroyed entities are drained into the ledger, each payload kind is
    /// built at most once and shared across sessions, dirty tags are
    /// cleared after the build, and acknowledged ledger records are purged.
    /// Returns the number of packets sent.
    pub fn replicate(&mut self, store: &mut EntityStore) -> usize {
        self.ledger_tick += 1;
        let tick = self.ledger_tick;
        for (entity, tags) in store.take_destroyed() {
            // Only entities that were announced at least once owe a
            // deletion message. A replicated entity that dies still
            // carrying its announce tag was never in any snapshot build,
            // so no peer has heard its ID.
            let announced =
                tags.contains(Tag::NetworkSyncEntity) && !tags.contains(Tag::NeedsEntitySync);
            if announced {
                debug!(%entity, tick, "recording destroyed entity");
                self.ledger.record(entity, tick);
            } else {
                debug!(%entity, tick, "destroyed before any announcement, nothing to retract");
            }
        }

        // Incremental payloads are shared by every synced session; new
        // entities suppress component updates for the tick because the full
        // component set already carries the latest values.
        let new_entities = planner::build_new_entities(store);
        let component_updates = if new_entities.is_empty() {
            planner::build_component_updates(store)
        } else {
            Vec::new()
        };

        let mut full_snapshot: Option<Vec<_>> = None;
        let mut outgoing: Vec<(PeerId, Packet)> = Vec::new();

        for session in self.sessions.values_mut() {
            let peer = session.peer();
            match planner::classify(store, session) {
                Some(SnapshotType::EntireRegistry) => {
                    let entities = full_snapshot
                        .get_or_insert_with(|| planner::build_full_snapshot(store))
                        .clone();
                    let sequence = session.next_sequence();
                    info!(%peer, sequence, entities = entities.len(), "sending entire registry");
                    outgoing.push((
                        peer,
                        Packet::ReplaceAllEntities(ReplaceAllEntities { sequence, entities }),
                    ));
                    session.on_full_sync_sent(sequence, tick);
                    // The snapshot re-baselines deletions; nothing more to
                    // send this peer this tick.
                    continue;
                }
                Some(SnapshotType::OnlyNewEntities) if !new_entities.is_empty() => {
                    let sequence = session.next_sequence();
                    outgoing.push((
                        peer,
                        Packet::AddNewEntities(AddNewEntities {
                            sequence,
                            entities: new_entities.clone(),
                        }),
                    ));
                }
                Some(SnapshotType::OnlyComponents) if !component_updates.is_empty() => {
                    let sequence = session.next_sequence();
                    outgoing.push((
                        peer,
                        Packet::OnlyComponentUpdate(OnlyComponentUpdate {
                            sequence,
                            updates: component_updates.clone(),
                        }),
                    ));
                }
                _ => {}
            }
            if !session.is_synced() {
                continue;
            }

            let pending = self.ledger.entities_after(session.deletion_send_floor());
            if !pending.is_empty() {
                let sequence = session.next_sequence();
                outgoing.push((
                    peer,
                    Packet::DestroyedEntities(DestroyedEntities {
                        sequence,
                        entities: pending,
                        policy: EntityOperationPolicy::SkipIfMissing,
                    }),
                ));
                session.record_deletions_sent(sequence, tick);
            }
        }

        // Tags are cleared only after every session saw the shared payload.
        // Sessions with a full snapshot in flight did not see it; the tick
        // stamp lets the ack handler catch them up (see `handle_packet`).
        if !new_entities.is_empty() {
            let announced: Vec<Entity> = new_entities.iter().map(|r| r.entity).collect();
            planner::clear_new_entity_tags(store);
            planner::clear_component_tags_for(store, &announced);
            self.last_dirty_tick = tick;
        } else if !component_updates.is_empty() {
            planner::clear_component_tags(store);
            self.last_dirty_tick = tick;
        }

        let mut sent = 0;
        for (peer, packet) in outgoing {
            if self.send(peer, &packet) {
                sent += 1;
            }
        }
        self.purge_deletions();
        sent
    }

    /// Encode and send one packet, on the channel its type calls for.
    /// Failures are logged and dropped; a send failure never unwinds the
    /// replication pass.
    fn send(&mut self, peer: PeerId, packet: &Packet) -> bool {
        let bytes = match encode(packet) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%peer, %error, packet_type = ?packet.packet_type(), "failed to encode packet");
                return false;
            }
        };
        if let Err(error) = self.transport.send(peer, bytes, packet.reliable()) {
            warn!(%peer, %error, packet_type = ?packet.packet_type(), "failed to send packet");
            return false;
        }
        true
    }

    fn handle_packet(&mut self, peer: PeerId, packet: Packet) {
        match packet {
            Packet::Ping(ping) => {
                self.send(peer, &Packet::Ping(Ping { nonce: ping.nonce }));
            }
            Packet::SetupSession(setup) => self.handle_setup(peer, setup),
            Packet::ClientInput(sample) => {
                self.events.push(ServerEvent::InputReceived {
                    peer,
                    tick: sample.tick,
                    input: sample.input,
                });
            }
            Packet::Message(message) => {
                self.events.push(ServerEvent::ChatReceived {
                    peer,
                    text: message.text,
                });
            }
            Packet::SnapshotAck(ack) => {
                if let Some(session) = self.sessions.get_mut(&peer) {
                    let was_synced = session.is_synced();
                    session.on_ack(ack.sequence);
                    // The store changed while the snapshot was in flight;
                    // those ticks consumed dirty tags this peer never saw,
                    // so its mirror is stale the moment it syncs.
                    if !was_synced
                        && session.is_synced()
                        && session.full_sync_tick() < self.last_dirty_tick
                    {
                        info!(%peer, "store changed during full-sync flight, scheduling resync");
                        session.mark_desynced();
                    }
                } else {
                    warn!(%peer, "ack from peer without session");
                }
                self.purge_deletions();
            }
            Packet::DesyncReport(report) => {
                warn!(%peer, last_sequence = report.last_sequence, "client reported desync");
                if let Some(session) = self.sessions.get_mut(&peer) {
                    session.mark_desynced();
                }
            }
            other => {
                warn!(%peer, packet_type = ?other.packet_type(), "unexpected packet on server");
            }
        }
    }

    fn handle_setup(&mut self, peer: PeerId, setup: SetupSession) {
        if setup.protocol_version != PROTOCOL_VERSION {
            warn!(
                %peer,
                client_version = setup.protocol_version,
                server_version = PROTOCOL_VERSION,
                "protocol version mismatch"
            );
            self.send(
                peer,
                &Packet::Message(ChatMessage {
                    text: format!(
                        "protocol version mismatch: server speaks {PROTOCOL_VERSION}, client spoke {}",
                        setup.protocol_version
                    ),
                }),
            );
            return;
        }
        let Some(session) = self.sessions.get_mut(&peer) else {
            warn!(%peer, "session setup from peer without session");
            return;
        };
        if session.begin_setup(setup.client_name.clone()) {
            self.events.push(ServerEvent::PeerJoined {
                peer,
                name: setup.client_name,
            });
        }
    }

    /// Drop ledger records every constraining session has acknowledged.
    fn purge_deletions(&mut self) {
        let mut floor: Option<u64> = None;
        for session in self.sessions.values() {
            if let Some(session_floor) = session.ledger_retention_floor() {
                floor = Some(floor.map_or(session_floor, |f| f.min(session_floor)));
            }
        }
        match floor {
            Some(floor) => self.ledger.purge_through(floor),
            // No session constrains retention; every future full sync
            // re-baselines past the current ledger.
            None => self.ledger.clear(),
        }
    }
}

impl<T: Transport> Endpoint for ReplicationServer<T> {
    fn on_connect(&mut self, peer: PeerId) {
        info!(%peer, "peer connected");
        self.sessions.insert(peer, ReplicationSession::new(peer));
    }

    fn on_disconnect(&mut self, peer: PeerId) {
        if self.sessions.remove(&peer).is_some() {
            info!(%peer, "peer disconnected");
            self.events.push(ServerEvent::PeerLeft { peer });
            self.purge_deletions();
        }
    }

    fn on_data(&mut self, peer: PeerId, bytes: &[u8]) {
        match decode(bytes) {
            Ok(packet) => self.handle_packet(peer, packet),
            Err(error) => {
                warn!(%peer, %error, len = bytes.len(), "dropping undecodable payload");
            }
        }
    }
}
