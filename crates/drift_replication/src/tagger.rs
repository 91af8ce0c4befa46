//! Dirty-marking bridge between gameplay mutation and snapshot planning.
//!
//! Writers call these functions; the planner reads the tags they set.
//! Clearing dirty tags is the planner's exclusive job — this module exposes
//! no way to remove them, so a writer can never race a snapshot into losing
//! an update.

use drift_store::{Component, ComponentTypeId, Entity, EntityStore, StoreError, Tag};

/// Mark a freshly created entity as visible to clients.
///
/// Adds [`Tag::NetworkSyncEntity`], [`Tag::NetworkSyncComponent`] and
/// [`Tag::NeedsEntitySync`]. The entity stays invisible to the planner
/// until [`mark_initialized`] is also called.
///
/// # Errors
///
/// Returns [`StoreError::EntityNotFound`] if the entity is not live.
pub fn mark_replicated(store: &mut EntityStore, entity: Entity) -> Result<(), StoreError> {
    store.tag(entity, Tag::NetworkSyncEntity)?;
    store.tag(entity, Tag::NetworkSyncComponent)?;
    store.tag(entity, Tag::NeedsEntitySync)
}

/// Mark an entity as fully constructed (all required components present).
///
/// Until this tag is set the planner skips the entity, so half-built
/// entities never replicate.
///
/// # Errors
///
/// Returns [`StoreError::EntityNotFound`] if the entity is not live.
pub fn mark_initialized(store: &mut EntityStore, entity: Entity) -> Result<(), StoreError> {
    store.tag(entity, Tag::EntityInitialized)
}

/// Record that component `T` on `entity` changed since the last snapshot.
///
/// Idempotent: marking the same component twice within a tick is a no-op.
///
/// # Errors
///
/// Returns [`StoreError::EntityNotFound`] if the entity is not live.
pub fn mark_component_changed<T: Component>(
    store: &mut EntityStore,
    entity: Entity,
) -> Result<(), StoreError> {
    store.mark_changed(entity, ComponentTypeId::of::<T>())?;
    store.tag(entity, Tag::NeedsComponentSync)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Odometer {
        km: f64,
    }

    impl Component for Odometer {
        fn type_name() -> &'static str {
            "Odometer"
        }
    }

    #[test]
    fn test_mark_replicated_sets_tags() {
        let mut store = EntityStore::new();
        let e = store.create().unwrap();
        mark_replicated(&mut store, e).unwrap();
        assert!(store.has_tag(e, Tag::NetworkSyncEntity));
        assert!(store.has_tag(e, Tag::NetworkSyncComponent));
        assert!(store.has_tag(e, Tag::NeedsEntitySync));
        assert!(!store.has_tag(e, Tag::EntityInitialized));
    }

    #[test]
    fn test_mark_component_changed_records_type() {
        let mut store = EntityStore::new();
        let e = store.create().unwrap();
        store.attach(e, Odometer { km: 12.5 }).unwrap();
        mark_component_changed::<Odometer>(&mut store, e).unwrap();
        mark_component_changed::<Odometer>(&mut store, e).unwrap();
        assert!(store.has_tag(e, Tag::NeedsComponentSync));
        assert_eq!(store.changed_types(e), vec![ComponentTypeId::of::<Odometer>()]);
    }

    #[test]
    fn test_marking_dead_entity_fails() {
        let mut store = EntityStore::new();
        let e = store.create().unwrap();
        store.destroy(e).unwrap();
        assert!(mark_replicated(&mut store, e).is_err());
        assert!(mark_initialized(&mut store, e).is_err());
    }
}
