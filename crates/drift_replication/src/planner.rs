//! Snapshot planning: decide per peer what kind of snapshot to send, and
//! build the payloads.
//!
//! Snapshot kinds are mutually exclusive per peer per tick. The tie-break
//! is structure before motion: a tick that has both new entities and
//! component changes sends only the new entities, and the component changes
//! ride along inside their full component sets. Deletions are orthogonal
//! and always sent.
//!
//! Incremental payloads are built once per tick from the global dirty tags
//! and shared across every synced peer; the tags are cleared only after the
//! build, so no peer can observe a half-cleared tick.

use tracing::{debug, warn};

use drift_protocol::{ComponentUpdate, EntityOperationPolicy, EntityRecord};
use drift_store::{Entity, EntityStore, Filter, Tag};

use crate::session::ReplicationSession;

/// What kind of snapshot a peer receives this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotType {
    /// Changed components on entities the peer already knows.
    OnlyComponents,
    /// Entities created since the peer's last snapshot, with their full
    /// component sets.
    OnlyNewEntities,
    /// The entire replicated registry; resets the peer's incremental state.
    EntireRegistry,
}

/// Decide what snapshot `session` needs, or `None` when there is nothing
/// to send.
#[must_use]
pub fn classify(store: &EntityStore, session: &ReplicationSession) -> Option<SnapshotType> {
    if session.wants_full_snapshot() {
        return Some(SnapshotType::EntireRegistry);
    }
    if !session.is_synced() {
        return None;
    }
    if store
        .iter(&new_entity_filter())
        .next()
        .is_some()
    {
        return Some(SnapshotType::OnlyNewEntities);
    }
    if store
        .iter(&component_change_filter())
        .next()
        .is_some()
    {
        return Some(SnapshotType::OnlyComponents);
    }
    None
}

/// Entities eligible for replication at all.
#[must_use]
pub fn replicated_filter() -> Filter {
    Filter::new()
        .with_tag(Tag::NetworkSyncEntity)
        .with_tag(Tag::EntityInitialized)
}

/// Replicated entities not yet announced to synced peers.
#[must_use]
pub fn new_entity_filter() -> Filter {
    replicated_filter().with_tag(Tag::NeedsEntitySync)
}

/// Replicated entities opted into component-level sync with pending
/// changes.
#[must_use]
pub fn component_change_filter() -> Filter {
    replicated_filter()
        .with_tag(Tag::NetworkSyncComponent)
        .with_tag(Tag::NeedsComponentSync)
}

/// Build the entire-registry payload: every initialized replicated entity
/// with its full component set.
///
/// An entity whose components fail to serialise is skipped and logged; the
/// snapshot ships without it rather than not at all.
#[must_use]
pub fn build_full_snapshot(store: &EntityStore) -> Vec<EntityRecord> {
    collect_entity_records(store, &replicated_filter())
}

/// Build the new-entities payload. Tags are not cleared here; the caller
/// clears them once the payload has been handed to every synced peer.
#[must_use]
pub fn build_new_entities(store: &EntityStore) -> Vec<EntityRecord> {
    collect_entity_records(store, &new_entity_filter())
}

fn collect_entity_records(store: &EntityStore, filter: &Filter) -> Vec<EntityRecord> {
    let mut records = Vec::new();
    for entity in store.iter(filter) {
        match store.serialize_components(entity) {
            Ok(components) => records.push(EntityRecord { entity, components }),
            Err(error) => {
                warn!(%entity, %error, "skipping entity in snapshot");
            }
        }
    }
    records
}

/// Build the changed-components payload from the per-entity changed sets.
///
/// A component that fails to serialise is skipped and logged; the rest of
/// the update still ships.
#[must_use]
pub fn build_component_updates(store: &EntityStore) -> Vec<ComponentUpdate> {
    let mut updates = Vec::new();
    for entity in store.iter(&component_change_filter()) {
        for type_id in store.changed_types(entity) {
            match store.serialize_component(entity, type_id) {
                Ok(data) => updates.push(ComponentUpdate {
                    entity,
                    component: drift_store::ComponentRecord { type_id, data },
                    policy: EntityOperationPolicy::MustApplyOnce,
                }),
                Err(error) => {
                    warn!(%entity, %error, "skipping component in update");
                }
            }
        }
    }
    updates
}

/// Clear the new-entity dirty tags after the payload has been shared with
/// every synced peer this tick.
pub fn clear_new_entity_tags(store: &mut EntityStore) {
    let entities: Vec<_> = store.iter(&new_entity_filter()).collect();
    for entity in entities {
        if let Err(error) = store.untag(entity, Tag::NeedsEntitySync) {
            debug!(%entity, %error, "entity vanished before tag clear");
        }
    }
}

/// Clear component dirt for entities whose full component sets just
/// shipped; their pending updates carry nothing the snapshot did not.
pub fn clear_component_tags_for(store: &mut EntityStore, entities: &[Entity]) {
    for &entity in entities {
        store.clear_changed(entity);
        if store.contains(entity)
            && let Err(error) = store.untag(entity, Tag::NeedsComponentSync)
        {
            debug!(%entity, %error, "entity vanished before tag clear");
        }
    }
}

/// Clear the component dirty tags and changed sets after the payload has
/// been shared with every synced peer this tick.
pub fn clear_component_tags(store: &mut EntityStore) {
    let entities: Vec<_> = store.iter(&component_change_filter()).collect();
    for entity in entities {
        store.clear_changed(entity);
        if let Err(error) = store.untag(entity, Tag::NeedsComponentSync) {
            debug!(%entity, %error, "entity vanished before tag clear");
        }
    }
}
