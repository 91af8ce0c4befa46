//! The DeletedEntity ledger.
//!
//! When an entity is destroyed its ID plus the replication tick of the
//! destruction is recorded here. A record outlives the entity until every
//! session that could know the entity has acknowledged the deletion; only
//! then is it purged. A missed deletion leaves a permanent ghost entity on
//! the client, so the ledger errs on the side of retention.

use drift_store::Entity;

/// An entity ID plus the replication tick at which it was destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedEntity {
    /// The destroyed entity.
    pub entity: Entity,
    /// The replication tick the destruction was recorded on.
    pub tick: u64,
}

/// Ordered record of destroyed entities awaiting acknowledgement.
#[derive(Debug, Default)]
pub struct DeletionLedger {
    /// Records in ascending tick order (ticks only ever grow).
    records: Vec<DeletedEntity>,
}

impl DeletionLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a destruction observed on `tick`.
    pub fn record(&mut self, entity: Entity, tick: u64) {
        self.records.push(DeletedEntity { entity, tick });
    }

    /// The entities destroyed strictly after `floor`, in destruction order.
    ///
    /// A session's floor is whichever is later of its full-sync baseline
    /// (deletions before it are invisible to that peer — the full snapshot
    /// simply omitted those entities) and the last tick it was already sent.
    #[must_use]
    pub fn entities_after(&self, floor: u64) -> Vec<Entity> {
        self.records
            .iter()
            .filter(|r| r.tick > floor)
            .map(|r| r.entity)
            .collect()
    }

    /// Drop every record with `tick <= floor`: all sessions that could know
    /// those entities have acknowledged their deletion.
    pub fn purge_through(&mut self, floor: u64) {
        self.records.retain(|r| r.tick > floor);
    }

    /// Drop every record. Used when no session constrains retention.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
