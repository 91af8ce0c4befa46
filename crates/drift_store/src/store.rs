//! The entity-component store.
//!
//! [`EntityStore`] owns all entities and their components. Components are
//! kept in one column per component type, keyed by [`ComponentTypeId`], so
//! attach/detach/get are all component-table lookups. Tags and the
//! changed-component sets live in side indexes keyed by entity.
//!
//! The store is single-threaded by contract: the replication pass runs on
//! the thread that owns it, and transport events are queued and drained on
//! that same thread.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};

use crate::component::{Component, ComponentRecord, ComponentTypeId};
use crate::entity::{Entity, EntityAllocator};
use crate::tag::{Tag, TagSet};

/// Errors produced by [`EntityStore`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The entity does not exist (never created, or already destroyed).
    #[error("{0} not found")]
    EntityNotFound(Entity),

    /// The entity already exists in this store.
    #[error("{0} already exists")]
    EntityExists(Entity),

    /// The entity exists but does not carry the requested component.
    #[error("component '{name}' not found on {entity}")]
    ComponentNotFound {
        /// The component's type name.
        name: &'static str,
        /// The entity that was queried.
        entity: Entity,
    },

    /// A wire record referenced a component type this store has never
    /// registered. Recoverable: the caller skips the record and logs.
    #[error("unknown component type id {id:#018x}", id = .0.0)]
    UnknownComponentType(ComponentTypeId),

    /// Failed to serialise a component instance for the wire.
    #[error("failed to encode component '{name}' on {entity}: {message}")]
    ComponentEncode {
        /// The component's type name.
        name: &'static str,
        /// The entity being serialised.
        entity: Entity,
        /// The underlying encoder error.
        message: String,
    },

    /// Failed to deserialise a component instance from wire bytes.
    #[error("failed to decode component '{name}' for {entity}: {message}")]
    ComponentDecode {
        /// The component's type name.
        name: &'static str,
        /// The entity being written.
        entity: Entity,
        /// The underlying decoder error.
        message: String,
    },

    /// The 64-bit entity ID space ran out. Fatal: in practice this means an
    /// allocation leak, not a legitimately full world.
    #[error("entity id space exhausted")]
    IdSpaceExhausted,
}

/// A filter over entities, matched by component and tag presence.
///
/// ```rust
/// use drift_store::{Filter, Tag};
///
/// let replicable = Filter::new()
///     .with_tag(Tag::NetworkSyncEntity)
///     .with_tag(Tag::EntityInitialized);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Filter {
    components: Vec<ComponentTypeId>,
    tags: TagSet,
}

impl Filter {
    /// Create an empty filter that matches every entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the component type `T` to be present.
    #[must_use]
    pub fn with_component<T: Component>(mut self) -> Self {
        self.components.push(ComponentTypeId::of::<T>());
        self
    }

    /// Require a component type by its ID.
    #[must_use]
    pub fn with_component_id(mut self, type_id: ComponentTypeId) -> Self {
        self.components.push(type_id);
        self
    }

    /// Require a tag to be present.
    #[must_use]
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }
}

/// Type-erased storage for one component type.
///
/// The wire-identity method is deliberately not named `type_id`: `Any` is
/// in scope here and its blanket `type_id` on the boxed column would win
/// method resolution.
trait Column: Send + Sync {
    fn component_type_id(&self) -> ComponentTypeId;
    fn type_name(&self) -> &'static str;
    fn contains(&self, entity: Entity) -> bool;
    fn remove(&mut self, entity: Entity) -> bool;
    fn clear(&mut self);
    /// Serialise the component held for `entity` into MessagePack bytes.
    fn serialize(&self, entity: Entity) -> Result<Vec<u8>, StoreError>;
    /// Decode `bytes` and store the value for `entity`, replacing any
    /// existing value.
    fn apply(&mut self, entity: Entity, bytes: &[u8]) -> Result<(), StoreError>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Concrete column for component type `T`.
struct TypedColumn<T: Component> {
    values: HashMap<Entity, T>,
}

impl<T: Component> TypedColumn<T> {
    fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }
}

impl<T: Component> Column for TypedColumn<T> {
    fn component_type_id(&self) -> ComponentTypeId {
        ComponentTypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        T::type_name()
    }

    fn contains(&self, entity: Entity) -> bool {
        self.values.contains_key(&entity)
    }

    fn remove(&mut self, entity: Entity) -> bool {
        self.values.remove(&entity).is_some()
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn serialize(&self, entity: Entity) -> Result<Vec<u8>, StoreError> {
        let value = self
            .values
            .get(&entity)
            .ok_or(StoreError::ComponentNotFound {
                name: T::type_name(),
                entity,
            })?;
        rmp_serde::to_vec_named(value).map_err(|e| StoreError::ComponentEncode {
            name: T::type_name(),
            entity,
            message: e.to_string(),
        })
    }

    fn apply(&mut self, entity: Entity, bytes: &[u8]) -> Result<(), StoreError> {
        let value: T = rmp_serde::from_slice(bytes).map_err(|e| StoreError::ComponentDecode {
            name: T::type_name(),
            entity,
            message: e.to_string(),
        })?;
        self.values.insert(entity, value);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The entity-component store.
///
/// One instance is authoritative per server process; clients hold a mirror
/// instance that is rebuilt from snapshots. Iteration order is entity
/// insertion order, but destruction swap-removes, so order is not stable
/// across destroy/create cycles.
pub struct EntityStore {
    /// Entity ID allocator (server side only; mirrors use [`EntityStore::insert`]).
    allocator: EntityAllocator,
    /// Live entities in insertion order.
    entities: Vec<Entity>,
    /// Entity → index into `entities`.
    rows: HashMap<Entity, usize>,
    /// One column per registered component type.
    columns: HashMap<ComponentTypeId, Box<dyn Column>>,
    /// Replication tag side index.
    tags: HashMap<Entity, TagSet>,
    /// Which component types changed per entity since the last snapshot.
    changed: HashMap<Entity, BTreeSet<ComponentTypeId>>,
    /// Entities destroyed since the replication layer last drained them,
    /// each with the tag set it carried at death.
    pending_destroyed: Vec<(Entity, TagSet)>,
}

impl EntityStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            entities: Vec::new(),
            rows: HashMap::new(),
            columns: HashMap::new(),
            tags: HashMap::new(),
            changed: HashMap::new(),
            pending_destroyed: Vec::new(),
        }
    }

    // ── Entity lifecycle ────────────────────────────────────────────────────

    /// Create a new entity with a fresh unique ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IdSpaceExhausted`] if the 64-bit ID space ran
    /// out. Callers treat this as fatal.
    pub fn create(&mut self) -> Result<Entity, StoreError> {
        let entity = self
            .allocator
            .allocate()
            .ok_or(StoreError::IdSpaceExhausted)?;
        self.rows.insert(entity, self.entities.len());
        self.entities.push(entity);
        Ok(entity)
    }

    /// Insert an entity with a server-issued ID into a mirror store.
    ///
    /// Client mirrors never allocate; every entity they hold was named by
    /// the server.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityExists`] if the ID is already live, and
    /// [`StoreError::EntityNotFound`] for the invalid sentinel ID.
    pub fn insert(&mut self, entity: Entity) -> Result<(), StoreError> {
        if !entity.is_valid() {
            return Err(StoreError::EntityNotFound(entity));
        }
        if self.rows.contains_key(&entity) {
            return Err(StoreError::EntityExists(entity));
        }
        self.rows.insert(entity, self.entities.len());
        self.entities.push(entity);
        Ok(())
    }

    /// Destroy an entity, removing all its components, tags and changed-set.
    ///
    /// The ID is recorded in the pending-destroyed list so the replication
    /// layer can pick it up on its next pass (see [`EntityStore::take_destroyed`]).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if the entity is not live.
    pub fn destroy(&mut self, entity: Entity) -> Result<(), StoreError> {
        let row = self
            .rows
            .remove(&entity)
            .ok_or(StoreError::EntityNotFound(entity))?;
        self.entities.swap_remove(row);
        // Fix the row index of the entity that was swapped into `row`.
        if let Some(&moved) = self.entities.get(row) {
            self.rows.insert(moved, row);
        }
        for column in self.columns.values_mut() {
            column.remove(entity);
        }
        let tags = self.tags.remove(&entity).unwrap_or_default();
        self.changed.remove(&entity);
        self.pending_destroyed.push((entity, tags));
        Ok(())
    }

    /// Returns `true` if the entity is live.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.rows.contains_key(&entity)
    }

    /// Drain the entities destroyed since the last call, each paired with
    /// the tag set it carried at death. The tags let the replication layer
    /// tell whether the entity was ever announced before it died.
    pub fn take_destroyed(&mut self) -> Vec<(Entity, TagSet)> {
        std::mem::take(&mut self.pending_destroyed)
    }

    /// Current live entity count.
    #[must_use]
    pub fn size(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entities are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Remove every entity, tag and component value, keeping registered
    /// component types. Mirrors call this before applying an
    /// entire-registry snapshot so the result depends on nothing prior.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.rows.clear();
        self.tags.clear();
        self.changed.clear();
        self.pending_destroyed.clear();
        for column in self.columns.values_mut() {
            column.clear();
        }
    }

    // ── Components ──────────────────────────────────────────────────────────

    /// Register component type `T` so wire records carrying its
    /// [`ComponentTypeId`] can be applied to this store.
    ///
    /// Attaching a value registers the type implicitly; mirror stores must
    /// register every replicated type up front since they only ever see
    /// bytes.
    pub fn register<T: Component>(&mut self) {
        self.columns
            .entry(ComponentTypeId::of::<T>())
            .or_insert_with(|| Box::new(TypedColumn::<T>::new()));
    }

    /// Attach a component value to an entity. Re-attachment replaces the
    /// existing value, it does not stack.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if the entity is not live.
    pub fn attach<T: Component>(&mut self, entity: Entity, value: T) -> Result<(), StoreError> {
        if !self.contains(entity) {
            return Err(StoreError::EntityNotFound(entity));
        }
        self.register::<T>();
        let column = self
            .columns
            .get_mut(&ComponentTypeId::of::<T>())
            .and_then(|c| c.as_any_mut().downcast_mut::<TypedColumn<T>>())
            .ok_or(StoreError::UnknownComponentType(ComponentTypeId::of::<T>()))?;
        column.values.insert(entity, value);
        Ok(())
    }

    /// Detach a component from an entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if the entity is not live, or
    /// [`StoreError::ComponentNotFound`] if it does not carry `T`.
    pub fn detach<T: Component>(&mut self, entity: Entity) -> Result<(), StoreError> {
        if !self.contains(entity) {
            return Err(StoreError::EntityNotFound(entity));
        }
        let removed = self
            .columns
            .get_mut(&ComponentTypeId::of::<T>())
            .is_some_and(|c| c.remove(entity));
        if removed {
            Ok(())
        } else {
            Err(StoreError::ComponentNotFound {
                name: T::type_name(),
                entity,
            })
        }
    }

    /// Get a reference to an entity's component of type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if the entity is not live, or
    /// [`StoreError::ComponentNotFound`] if it does not carry `T`.
    pub fn get<T: Component>(&self, entity: Entity) -> Result<&T, StoreError> {
        if !self.contains(entity) {
            return Err(StoreError::EntityNotFound(entity));
        }
        self.columns
            .get(&ComponentTypeId::of::<T>())
            .and_then(|c| c.as_any().downcast_ref::<TypedColumn<T>>())
            .and_then(|c| c.values.get(&entity))
            .ok_or(StoreError::ComponentNotFound {
                name: T::type_name(),
                entity,
            })
    }

    /// Get a mutable reference to an entity's component of type `T`.
    ///
    /// Mutating through this reference does **not** mark the component
    /// changed; replication-relevant writers go through the tagger.
    ///
    /// # Errors
    ///
    /// Same conditions as [`EntityStore::get`].
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T, StoreError> {
        if !self.contains(entity) {
            return Err(StoreError::EntityNotFound(entity));
        }
        self.columns
            .get_mut(&ComponentTypeId::of::<T>())
            .and_then(|c| c.as_any_mut().downcast_mut::<TypedColumn<T>>())
            .and_then(|c| c.values.get_mut(&entity))
            .ok_or(StoreError::ComponentNotFound {
                name: T::type_name(),
                entity,
            })
    }

    /// Returns `true` if the entity carries component type `T`.
    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.has_component(entity, ComponentTypeId::of::<T>())
    }

    /// Returns `true` if the entity carries the component type with this ID.
    #[must_use]
    pub fn has_component(&self, entity: Entity, type_id: ComponentTypeId) -> bool {
        self.columns
            .get(&type_id)
            .is_some_and(|c| c.contains(entity))
    }

    /// Serialise every component on `entity` into wire records, sorted by
    /// type ID for a deterministic encoding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if the entity is not live, or
    /// the first [`StoreError::ComponentEncode`] failure. Callers that want
    /// partial snapshots skip the entity and log.
    pub fn serialize_components(&self, entity: Entity) -> Result<Vec<ComponentRecord>, StoreError> {
        if !self.contains(entity) {
            return Err(StoreError::EntityNotFound(entity));
        }
        let mut records = Vec::new();
        for column in self.columns.values() {
            if column.contains(entity) {
                records.push(ComponentRecord {
                    type_id: column.component_type_id(),
                    data: column.serialize(entity)?,
                });
            }
        }
        records.sort_by_key(|r| r.type_id);
        Ok(records)
    }

    /// Serialise one component on `entity` by type ID.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownComponentType`] for an unregistered type,
    /// otherwise the same conditions as [`EntityStore::serialize_components`].
    pub fn serialize_component(
        &self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<Vec<u8>, StoreError> {
        let column = self
            .columns
            .get(&type_id)
            .ok_or(StoreError::UnknownComponentType(type_id))?;
        column.serialize(entity)
    }

    /// Apply a wire component record to an entity, replacing any existing
    /// value of that type.
    ///
    /// # Errors
    ///
    /// [`StoreError::EntityNotFound`] if the entity is not live,
    /// [`StoreError::UnknownComponentType`] if the type was never
    /// registered, or [`StoreError::ComponentDecode`] if the bytes are
    /// invalid.
    pub fn apply_component(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        if !self.contains(entity) {
            return Err(StoreError::EntityNotFound(entity));
        }
        let column = self
            .columns
            .get_mut(&type_id)
            .ok_or(StoreError::UnknownComponentType(type_id))?;
        column.apply(entity, bytes)
    }

    // ── Tags ────────────────────────────────────────────────────────────────

    /// Add a tag to an entity. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if the entity is not live.
    pub fn tag(&mut self, entity: Entity, tag: Tag) -> Result<(), StoreError> {
        if !self.contains(entity) {
            return Err(StoreError::EntityNotFound(entity));
        }
        self.tags.entry(entity).or_default().insert(tag);
        Ok(())
    }

    /// Remove a tag from an entity. Removing an absent tag is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if the entity is not live.
    pub fn untag(&mut self, entity: Entity, tag: Tag) -> Result<(), StoreError> {
        if !self.contains(entity) {
            return Err(StoreError::EntityNotFound(entity));
        }
        if let Some(set) = self.tags.get_mut(&entity) {
            set.remove(tag);
        }
        Ok(())
    }

    /// Returns `true` if the entity carries `tag`.
    #[must_use]
    pub fn has_tag(&self, entity: Entity, tag: Tag) -> bool {
        self.tags
            .get(&entity)
            .is_some_and(|set| set.contains(tag))
    }

    /// Returns `true` if any live entity carries `tag`.
    #[must_use]
    pub fn any_tagged(&self, tag: Tag) -> bool {
        self.tags.values().any(|set| set.contains(tag))
    }

    // ── Changed-component tracking ──────────────────────────────────────────

    /// Record that `type_id` changed on `entity` since the last snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] if the entity is not live.
    pub fn mark_changed(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<(), StoreError> {
        if !self.contains(entity) {
            return Err(StoreError::EntityNotFound(entity));
        }
        self.changed.entry(entity).or_default().insert(type_id);
        Ok(())
    }

    /// The component types recorded as changed on `entity`, sorted.
    #[must_use]
    pub fn changed_types(&self, entity: Entity) -> Vec<ComponentTypeId> {
        self.changed
            .get(&entity)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Forget the changed-set for `entity`.
    pub fn clear_changed(&mut self, entity: Entity) {
        self.changed.remove(&entity);
    }

    // ── Iteration ───────────────────────────────────────────────────────────

    /// Iterate over all live entities in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter().copied()
    }

    /// Lazily iterate over entities matching `filter`, in insertion order.
    pub fn iter<'a>(&'a self, filter: &'a Filter) -> impl Iterator<Item = Entity> + 'a {
        self.entities
            .iter()
            .copied()
            .filter(move |&e| self.matches(e, filter))
    }

    /// Visit each entity matching `filter`, with mutable store access.
    ///
    /// The matching set is snapshotted before the first call, so the closure
    /// may attach components or tags freely. Destroying the entity currently
    /// being visited is the caller's responsibility to defer; entities
    /// destroyed mid-pass are skipped rather than visited.
    pub fn each<F>(&mut self, filter: &Filter, mut f: F)
    where
        F: FnMut(&mut EntityStore, Entity),
    {
        let matched: Vec<Entity> = self.iter(filter).collect();
        for entity in matched {
            if self.contains(entity) {
                f(self, entity);
            }
        }
    }

    fn matches(&self, entity: Entity, filter: &Filter) -> bool {
        if !filter.tags.is_empty() {
            let tags = self.tags.get(&entity).copied().unwrap_or_default();
            if !tags.contains_all(filter.tags) {
                return false;
            }
        }
        filter
            .components
            .iter()
            .all(|&ty| self.has_component(entity, ty))
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl Component for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Speed {
        value: f32,
    }

    impl Component for Speed {
        fn type_name() -> &'static str {
            "Speed"
        }
    }

    #[test]
    fn test_create_destroy_leaves_size_unchanged() {
        let mut store = EntityStore::new();
        let before = store.size();
        let e = store.create().unwrap();
        store.destroy(e).unwrap();
        assert_eq!(store.size(), before);
        assert!(matches!(
            store.get::<Position>(e),
            Err(StoreError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_destroy_unknown_entity_fails() {
        let mut store = EntityStore::new();
        assert!(matches!(
            store.destroy(Entity::from_raw(99)),
            Err(StoreError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_destroyed_entities_are_drained_with_final_tags() {
        let mut store = EntityStore::new();
        let a = store.create().unwrap();
        let b = store.create().unwrap();
        store.tag(a, Tag::NeedsEntitySync).unwrap();
        store.destroy(a).unwrap();
        store.destroy(b).unwrap();

        let drained = store.take_destroyed();
        let ids: Vec<Entity> = drained.iter().map(|&(e, _)| e).collect();
        assert_eq!(ids, vec![a, b]);
        assert!(drained[0].1.contains(Tag::NeedsEntitySync));
        assert!(drained[1].1.is_empty());
        assert!(store.take_destroyed().is_empty());
    }

    #[test]
    fn test_attach_get_detach() {
        let mut store = EntityStore::new();
        let e = store.create().unwrap();
        store.attach(e, Position { x: 1.0, y: 2.0 }).unwrap();
        assert_eq!(store.get::<Position>(e).unwrap().x, 1.0);
        store.detach::<Position>(e).unwrap();
        assert!(matches!(
            store.get::<Position>(e),
            Err(StoreError::ComponentNotFound { .. })
        ));
    }

    #[test]
    fn test_reattach_replaces() {
        let mut store = EntityStore::new();
        let e = store.create().unwrap();
        store.attach(e, Position { x: 1.0, y: 2.0 }).unwrap();
        store.attach(e, Position { x: 3.0, y: 4.0 }).unwrap();
        assert_eq!(
            *store.get::<Position>(e).unwrap(),
            Position { x: 3.0, y: 4.0 }
        );
    }

    #[test]
    fn test_get_missing_component() {
        let mut store = EntityStore::new();
        let e = store.create().unwrap();
        assert!(matches!(
            store.get::<Position>(e),
            Err(StoreError::ComponentNotFound { .. })
        ));
    }

    #[test]
    fn test_insert_mirror_entity() {
        let mut store = EntityStore::new();
        let remote = Entity::from_raw(77);
        store.insert(remote).unwrap();
        assert!(store.contains(remote));
        assert!(matches!(
            store.insert(remote),
            Err(StoreError::EntityExists(_))
        ));
        assert!(matches!(
            store.insert(Entity::INVALID),
            Err(StoreError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_tags_are_idempotent() {
        let mut store = EntityStore::new();
        let e = store.create().unwrap();
        store.tag(e, Tag::NetworkSyncEntity).unwrap();
        store.tag(e, Tag::NetworkSyncEntity).unwrap();
        assert!(store.has_tag(e, Tag::NetworkSyncEntity));
        store.untag(e, Tag::NetworkSyncEntity).unwrap();
        assert!(!store.has_tag(e, Tag::NetworkSyncEntity));
        store.untag(e, Tag::NetworkSyncEntity).unwrap();
    }

    #[test]
    fn test_changed_tracking() {
        let mut store = EntityStore::new();
        let e = store.create().unwrap();
        store.attach(e, Position { x: 0.0, y: 0.0 }).unwrap();
        store
            .mark_changed(e, ComponentTypeId::of::<Position>())
            .unwrap();
        assert_eq!(store.changed_types(e), vec![ComponentTypeId::of::<Position>()]);
        store.clear_changed(e);
        assert!(store.changed_types(e).is_empty());
    }

    #[test]
    fn test_filtered_iteration() {
        let mut store = EntityStore::new();
        let a = store.create().unwrap();
        let b = store.create().unwrap();
        let c = store.create().unwrap();
        store.attach(a, Position { x: 0.0, y: 0.0 }).unwrap();
        store.attach(b, Position { x: 0.0, y: 0.0 }).unwrap();
        store.attach(b, Speed { value: 1.0 }).unwrap();
        store.tag(c, Tag::NetworkSyncEntity).unwrap();

        let with_position = Filter::new().with_component::<Position>();
        let found: Vec<Entity> = store.iter(&with_position).collect();
        assert_eq!(found, vec![a, b]);

        let with_both = Filter::new()
            .with_component::<Position>()
            .with_component::<Speed>();
        assert_eq!(store.iter(&with_both).collect::<Vec<_>>(), vec![b]);

        let tagged = Filter::new().with_tag(Tag::NetworkSyncEntity);
        assert_eq!(store.iter(&tagged).collect::<Vec<_>>(), vec![c]);
    }

    #[test]
    fn test_each_allows_attaching_mid_pass() {
        let mut store = EntityStore::new();
        let a = store.create().unwrap();
        let b = store.create().unwrap();
        store.attach(a, Position { x: 0.0, y: 0.0 }).unwrap();
        store.attach(b, Position { x: 0.0, y: 0.0 }).unwrap();

        let filter = Filter::new().with_component::<Position>();
        let mut visited = 0;
        store.each(&filter, |store, entity| {
            store.attach(entity, Speed { value: 9.0 }).unwrap();
            visited += 1;
        });
        assert_eq!(visited, 2);
        assert!(store.has::<Speed>(a));
        assert!(store.has::<Speed>(b));
    }

    #[test]
    fn test_serialize_and_apply_roundtrip() {
        let mut server = EntityStore::new();
        let e = server.create().unwrap();
        server.attach(e, Position { x: 5.0, y: 6.0 }).unwrap();
        server.attach(e, Speed { value: 3.0 }).unwrap();
        let records = server.serialize_components(e).unwrap();
        assert_eq!(records.len(), 2);

        let mut mirror = EntityStore::new();
        mirror.register::<Position>();
        mirror.register::<Speed>();
        mirror.insert(e).unwrap();
        for record in &records {
            mirror.apply_component(e, record.type_id, &record.data).unwrap();
        }
        assert_eq!(
            *mirror.get::<Position>(e).unwrap(),
            Position { x: 5.0, y: 6.0 }
        );
        assert_eq!(*mirror.get::<Speed>(e).unwrap(), Speed { value: 3.0 });
    }

    #[test]
    fn test_serialized_records_carry_component_type_ids() {
        let mut store = EntityStore::new();
        let e = store.create().unwrap();
        store.attach(e, Position { x: 1.0, y: 2.0 }).unwrap();
        store.attach(e, Speed { value: 3.0 }).unwrap();

        let ids: Vec<ComponentTypeId> = store
            .serialize_components(e)
            .unwrap()
            .iter()
            .map(|r| r.type_id)
            .collect();
        assert!(ids.contains(&ComponentTypeId::of::<Position>()));
        assert!(ids.contains(&ComponentTypeId::of::<Speed>()));
    }

    #[test]
    fn test_apply_unknown_component_type() {
        let mut mirror = EntityStore::new();
        let e = Entity::from_raw(1);
        mirror.insert(e).unwrap();
        let result = mirror.apply_component(e, ComponentTypeId(0xdead_beef), &[0x90]);
        assert!(matches!(
            result,
            Err(StoreError::UnknownComponentType(_))
        ));
    }

    #[test]
    fn test_clear_keeps_registered_types() {
        let mut store = EntityStore::new();
        let e = store.create().unwrap();
        store.attach(e, Position { x: 1.0, y: 1.0 }).unwrap();
        store.clear();
        assert!(store.is_empty());

        // The Position column survived the clear, so applies still work.
        let remote = Entity::from_raw(50);
        store.insert(remote).unwrap();
        let bytes = rmp_serde::to_vec_named(&Position { x: 2.0, y: 2.0 }).unwrap();
        store
            .apply_component(remote, ComponentTypeId::of::<Position>(), &bytes)
            .unwrap();
        assert_eq!(store.get::<Position>(remote).unwrap().x, 2.0);
    }
}
