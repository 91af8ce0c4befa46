//! Per-peer replication session state.
//!
//! Each connected peer has one [`ReplicationSession`] on the server. It
//! tracks where the peer is in the
//! `Connecting → AwaitingFullSync → Synced → (transient) Desynced`
//! state machine, which snapshot sequences the peer has acknowledged, and
//! how far through the deletion ledger the peer has been taken. Transitions
//! are driven by transport events and by acknowledgement / desync-report
//! messages, never by polling.

use tracing::{debug, info, warn};
use uuid::Uuid;

use drift_protocol::PeerId;

/// Where a peer is in the replication lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport-level handshake only; no game state is sent.
    Connecting,
    /// The planner is forced into entire-registry snapshots until one is
    /// acknowledged.
    AwaitingFullSync,
    /// Steady-state incremental replication.
    Synced,
    /// The incremental stream broke; transient, forces a return to
    /// `AwaitingFullSync` on the next planner pass.
    Desynced,
}

/// Server-side replication state for one peer.
#[derive(Debug)]
pub struct ReplicationSession {
    peer: PeerId,
    session_id: Uuid,
    client_name: Option<String>,
    state: SessionState,
    /// Next outgoing snapshot sequence (starts at 1; 0 means "none").
    next_sequence: u64,
    /// Highest sequence the peer has acknowledged.
    acked_sequence: u64,
    /// Sequence of the pending/last entire-registry snapshot (0 = none).
    full_sync_sequence: u64,
    /// Ledger tick of the last full-sync build; deletions at or before it
    /// are invisible to this peer.
    deletion_baseline: u64,
    /// Ledger tick covered by deletion messages already sent.
    deletions_sent: u64,
    /// Ledger tick covered by acknowledged deletion messages.
    deletions_acked: u64,
    /// Sent-but-unacked deletion messages: (packet sequence, ledger tick).
    outstanding_deletions: Vec<(u64, u64)>,
}

impl ReplicationSession {
    /// Create a session for a freshly connected peer.
    #[must_use]
    pub fn new(peer: PeerId) -> Self {
        let session_id = Uuid::new_v4();
        info!(%peer, %session_id, "session created");
        Self {
            peer,
            session_id,
            client_name: None,
            state: SessionState::Connecting,
            next_sequence: 1,
            acked_sequence: 0,
            full_sync_sequence: 0,
            deletion_baseline: 0,
            deletions_sent: 0,
            deletions_acked: 0,
            outstanding_deletions: Vec::new(),
        }
    }

    /// The peer this session belongs to.
    #[must_use]
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// The unique ID of this session instance.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// The name the client joined under, once setup completed.
    #[must_use]
    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Highest sequence the peer has acknowledged.
    #[must_use]
    pub fn acked_sequence(&self) -> u64 {
        self.acked_sequence
    }

    /// Complete session setup with the client's join request.
    ///
    /// Returns `true` on the `Connecting → AwaitingFullSync` transition;
    /// repeated setup requests are ignored and return `false`.
    pub fn begin_setup(&mut self, client_name: String) -> bool {
        if self.state != SessionState::Connecting {
            debug!(peer = %self.peer, "ignoring repeated session setup");
            return false;
        }
        info!(peer = %self.peer, client_name, "session setup complete, awaiting full sync");
        self.client_name = Some(client_name);
        self.state = SessionState::AwaitingFullSync;
        true
    }

    /// Whether the planner must build an entire-registry snapshot for this
    /// peer on its next pass.
    ///
    /// `false` while a full snapshot is already in flight: the transport's
    /// reliable channel delivers it, so it is not re-sent every tick.
    #[must_use]
    pub fn wants_full_snapshot(&self) -> bool {
        match self.state {
            SessionState::AwaitingFullSync => self.full_sync_sequence == 0,
            SessionState::Desynced => true,
            SessionState::Connecting | SessionState::Synced => false,
        }
    }

    /// Whether the peer is in steady-state incremental replication.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.state == SessionState::Synced
    }

    /// Issue the next outgoing snapshot sequence number.
    pub fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Record that an entire-registry snapshot went out.
    ///
    /// Resets the peer's dirty window: the deletion baseline moves to
    /// `ledger_tick`, since every deletion up to the build is expressed by
    /// the snapshot simply omitting those entities.
    pub fn on_full_sync_sent(&mut self, sequence: u64, ledger_tick: u64) {
        self.state = SessionState::AwaitingFullSync;
        self.full_sync_sequence = sequence;
        self.deletion_baseline = ledger_tick;
        self.deletions_sent = ledger_tick;
        self.deletions_acked = ledger_tick;
        self.outstanding_deletions.clear();
        debug!(peer = %self.peer, sequence, ledger_tick, "entire-registry snapshot sent");
    }

    /// Apply a snapshot acknowledgement from the peer.
    pub fn on_ack(&mut self, sequence: u64) {
        if sequence > self.acked_sequence {
            self.acked_sequence = sequence;
        }
        if self.state == SessionState::AwaitingFullSync
            && self.full_sync_sequence != 0
            && sequence >= self.full_sync_sequence
        {
            info!(peer = %self.peer, sequence, "full sync acknowledged, session synced");
            self.state = SessionState::Synced;
        }
        // Deletion messages covered by this ack no longer pin the ledger.
        let mut acked_tick = self.deletions_acked;
        self.outstanding_deletions.retain(|&(seq, tick)| {
            if seq <= sequence {
                acked_tick = acked_tick.max(tick);
                false
            } else {
                true
            }
        });
        self.deletions_acked = acked_tick;
    }

    /// Force the session through a full resync.
    ///
    /// Entered on an explicit client desync report or on server-detected
    /// sequence trouble. The peer is never disconnected for this.
    pub fn mark_desynced(&mut self) {
        if self.state == SessionState::Desynced {
            return;
        }
        warn!(peer = %self.peer, state = ?self.state, "session desynced, forcing full resync");
        self.state = SessionState::Desynced;
        self.full_sync_sequence = 0;
    }

    /// Record that a deletion message covering the ledger up to
    /// `ledger_tick` went out under `sequence`.
    pub fn record_deletions_sent(&mut self, sequence: u64, ledger_tick: u64) {
        self.deletions_sent = self.deletions_sent.max(ledger_tick);
        self.outstanding_deletions.push((sequence, ledger_tick));
    }

    /// Ledger tick at which this peer's pending or last entire-registry
    /// snapshot was built (0 = none yet). Store state touched after this
    /// tick is not in that snapshot.
    #[must_use]
    pub fn full_sync_tick(&self) -> u64 {
        self.deletion_baseline
    }

    /// Ledger ticks at or below this floor need not be sent to this peer.
    #[must_use]
    pub fn deletion_send_floor(&self) -> u64 {
        self.deletions_sent.max(self.deletion_baseline)
    }

    /// Ledger ticks at or below this floor are acknowledged by this peer,
    /// or `None` when the session does not constrain ledger retention
    /// (its next full sync will re-baseline past everything current).
    #[must_use]
    pub fn ledger_retention_floor(&self) -> Option<u64> {
        match self.state {
            SessionState::Connecting | SessionState::Desynced => None,
            SessionState::AwaitingFullSync if self.full_sync_sequence == 0 => None,
            SessionState::AwaitingFullSync | SessionState::Synced => {
                Some(self.deletions_acked.max(self.deletion_baseline))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ReplicationSession {
        ReplicationSession::new(PeerId(7))
    }

    #[test]
    fn test_lifecycle_to_synced() {
        let mut s = session();
        assert_eq!(s.state(), SessionState::Connecting);
        assert!(!s.wants_full_snapshot());

        assert!(s.begin_setup("driver".to_string()));
        assert_eq!(s.state(), SessionState::AwaitingFullSync);
        assert!(s.wants_full_snapshot());
        assert_eq!(s.client_name(), Some("driver"));

        let seq = s.next_sequence();
        s.on_full_sync_sent(seq, 1);
        assert!(!s.wants_full_snapshot(), "full snapshot already in flight");
        assert_eq!(s.state(), SessionState::AwaitingFullSync);

        s.on_ack(seq);
        assert_eq!(s.state(), SessionState::Synced);
        assert!(s.is_synced());
    }

    #[test]
    fn test_repeated_setup_is_ignored() {
        let mut s = session();
        assert!(s.begin_setup("first".to_string()));
        assert!(!s.begin_setup("second".to_string()));
        assert_eq!(s.client_name(), Some("first"));
    }

    #[test]
    fn test_stale_ack_does_not_sync() {
        let mut s = session();
        s.begin_setup("driver".to_string());
        let seq = s.next_sequence();
        s.on_full_sync_sent(seq, 1);
        s.on_ack(seq - 1);
        assert_eq!(s.state(), SessionState::AwaitingFullSync);
    }

    #[test]
    fn test_desync_forces_new_full_snapshot() {
        let mut s = session();
        s.begin_setup("driver".to_string());
        let seq = s.next_sequence();
        s.on_full_sync_sent(seq, 1);
        s.on_ack(seq);
        assert!(s.is_synced());

        s.mark_desynced();
        assert_eq!(s.state(), SessionState::Desynced);
        assert!(s.wants_full_snapshot());
        assert!(s.ledger_retention_floor().is_none());

        let seq2 = s.next_sequence();
        s.on_full_sync_sent(seq2, 9);
        s.on_ack(seq2);
        assert!(s.is_synced());
        assert_eq!(s.ledger_retention_floor(), Some(9));
    }

    #[test]
    fn test_deletion_floors() {
        let mut s = session();
        s.begin_setup("driver".to_string());
        let full = s.next_sequence();
        s.on_full_sync_sent(full, 3);
        s.on_ack(full);

        // Baseline covers ticks <= 3.
        assert_eq!(s.full_sync_tick(), 3);
        assert_eq!(s.deletion_send_floor(), 3);
        assert_eq!(s.ledger_retention_floor(), Some(3));

        let del_seq = s.next_sequence();
        s.record_deletions_sent(del_seq, 5);
        assert_eq!(s.deletion_send_floor(), 5);
        // Not yet acked, so retention still pinned at the baseline.
        assert_eq!(s.ledger_retention_floor(), Some(3));

        s.on_ack(del_seq);
        assert_eq!(s.ledger_retention_floor(), Some(5));
    }

    #[test]
    fn test_sequences_are_monotonic() {
        let mut s = session();
        let a = s.next_sequence();
        let b = s.next_sequence();
        let c = s.next_sequence();
        assert!(a < b && b < c);
        assert_eq!(a, 1);
    }
}
