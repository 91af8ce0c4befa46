//! Replication tags — zero-size markers used for set membership.
//!
//! Tags carry no data; an entity either has a tag or it does not. They are
//! the bridge between gameplay mutation and snapshot planning: writers add
//! tags, the planner reads and clears them. Per entity the full tag set fits
//! in a single byte, stored as a side index in the store.

/// A zero-size marker attached to entities for replication bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    /// The entity is visible to clients and must be replicated.
    NetworkSyncEntity = 0,
    /// The entity's components are subject to component-level sync.
    NetworkSyncComponent = 1,
    /// At least one component changed since the last snapshot.
    NeedsComponentSync = 2,
    /// The entity is new since the last resync and must be announced.
    NeedsEntitySync = 3,
    /// The entity is fully constructed. Entities without this tag are
    /// invisible to the planner so half-built entities never replicate.
    EntityInitialized = 4,
}

impl Tag {
    /// The bit this tag occupies in a [`TagSet`].
    #[must_use]
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// A compact set of [`Tag`]s, one bit per tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TagSet(u8);

impl TagSet {
    /// The empty tag set.
    pub const EMPTY: TagSet = TagSet(0);

    /// Build a set from a slice of tags.
    #[must_use]
    pub fn of(tags: &[Tag]) -> Self {
        let mut set = Self::EMPTY;
        for &tag in tags {
            set.insert(tag);
        }
        set
    }

    /// Add a tag. Adding a tag twice is a no-op.
    pub fn insert(&mut self, tag: Tag) {
        self.0 |= tag.bit();
    }

    /// Remove a tag. Removing an absent tag is a no-op.
    pub fn remove(&mut self, tag: Tag) {
        self.0 &= !tag.bit();
    }

    /// Returns `true` if the set contains `tag`.
    #[must_use]
    pub const fn contains(self, tag: Tag) -> bool {
        self.0 & tag.bit() != 0
    }

    /// Returns `true` if every tag in `other` is also in `self`.
    #[must_use]
    pub const fn contains_all(self, other: TagSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if the set contains no tags.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}
