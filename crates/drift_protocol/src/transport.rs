//! The transport collaborator contract.
//!
//! The replication core does not own connections. It assumes a transport
//! that delivers byte payloads per peer, surfaces connect/disconnect/data
//! events, and can send on a reliable or an unreliable channel.
//!
//! Entity mutation is single-threaded: if the transport runs its I/O on
//! another thread, events land in an [`EventQueue`] and are drained on the
//! tick thread at a defined point, never applied immediately.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Identifies a connected peer. Issued by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Events the transport surfaces to the replication core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The peer completed the transport-level handshake.
    Connected(PeerId),
    /// The peer is gone (graceful close or timeout; the transport decides).
    Disconnected(PeerId),
    /// A byte payload arrived from the peer.
    DataReceived(PeerId, Vec<u8>),
}

/// Outbound half of the transport contract.
pub trait Transport {
    /// Send `bytes` to `peer`, on the reliable channel when `reliable` is
    /// set, best-effort otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the peer has no route. Loss on the
    /// unreliable channel is not an error.
    fn send(&mut self, peer: PeerId, bytes: Vec<u8>, reliable: bool) -> Result<(), TransportError>;
}

/// Create a linked event sender/queue pair.
///
/// The sender side is handed to the transport's I/O thread (it is cheap to
/// clone); the queue side stays with the tick thread.
#[must_use]
pub fn event_queue() -> (EventSender, EventQueue) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (EventSender { sender }, EventQueue { receiver })
}

/// Thread-safe intake for transport events.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSender {
    /// Queue an event for the tick thread.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ChannelClosed`] if the queue was dropped.
    pub fn send(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.sender
            .send(event)
            .map_err(|_| TransportError::ChannelClosed)
    }
}

/// Tick-thread side of the event queue.
#[derive(Debug)]
pub struct EventQueue {
    receiver: mpsc::UnboundedReceiver<TransportEvent>,
}

impl EventQueue {
    /// Drain every queued event without blocking.
    ///
    /// Called once per tick at the defined drain point; events are then
    /// applied in arrival order on the tick thread.
    pub fn drain(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_arrival_order() {
        let (sender, mut queue) = event_queue();
        sender.send(TransportEvent::Connected(PeerId(1))).unwrap();
        sender
            .send(TransportEvent::DataReceived(PeerId(1), vec![1, 2]))
            .unwrap();
        sender.send(TransportEvent::Disconnected(PeerId(1))).unwrap();

        let events = queue.drain();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], TransportEvent::Connected(PeerId(1)));
        assert_eq!(
            events[1],
            TransportEvent::DataReceived(PeerId(1), vec![1, 2])
        );
        assert_eq!(events[2], TransportEvent::Disconnected(PeerId(1)));
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_send_after_queue_dropped() {
        let (sender, queue) = event_queue();
        drop(queue);
        assert!(matches!(
            sender.send(TransportEvent::Connected(PeerId(1))),
            Err(TransportError::ChannelClosed)
        ));
    }

    #[test]
    fn test_senders_are_cloneable() {
        let (sender, mut queue) = event_queue();
        let clone = sender.clone();
        clone.send(TransportEvent::Connected(PeerId(9))).unwrap();
        assert_eq!(queue.drain().len(), 1);
    }
}
