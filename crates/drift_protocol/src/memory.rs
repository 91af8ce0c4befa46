//! In-process transport for tests and demos.
//!
//! A [`MemoryNetwork`] routes payloads between endpoints living in the same
//! process. Delivery is immediate and ordered, and the reliable flag is
//! accepted but has nothing to do — nothing is ever dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::error::TransportError;
use crate::transport::{EventQueue, EventSender, PeerId, Transport, TransportEvent, event_queue};

/// A shared in-process network endpoints register with.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    routes: Arc<Mutex<HashMap<PeerId, EventSender>>>,
}

impl MemoryNetwork {
    /// Create an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint under `peer` and return its transport handle
    /// plus the event queue its owner drains each tick.
    pub fn endpoint(&self, peer: PeerId) -> (MemoryTransport, EventQueue) {
        let (sender, queue) = event_queue();
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(peer, sender);
        }
        (
            MemoryTransport {
                local: peer,
                network: self.clone(),
            },
            queue,
        )
    }

    /// Simulate the transport handshake completing between two endpoints:
    /// each side observes a `Connected` event naming the other.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::PeerNotConnected`] if either endpoint was
    /// never registered.
    pub fn connect(&self, a: PeerId, b: PeerId) -> Result<(), TransportError> {
        self.deliver(a, TransportEvent::Connected(b))?;
        self.deliver(b, TransportEvent::Connected(a))
    }

    /// Simulate a disconnect: each side observes the other leaving.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::PeerNotConnected`] if either endpoint was
    /// never registered.
    pub fn disconnect(&self, a: PeerId, b: PeerId) -> Result<(), TransportError> {
        self.deliver(a, TransportEvent::Disconnected(b))?;
        self.deliver(b, TransportEvent::Disconnected(a))
    }

    fn deliver(&self, to: PeerId, event: TransportEvent) -> Result<(), TransportError> {
        let sender = {
            let routes = self
                .routes
                .lock()
                .map_err(|_| TransportError::ChannelClosed)?;
            routes
                .get(&to)
                .cloned()
                .ok_or(TransportError::PeerNotConnected(to))?
        };
        sender.send(event)
    }
}

/// Outbound handle for one endpoint of a [`MemoryNetwork`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    local: PeerId,
    network: MemoryNetwork,
}

impl MemoryTransport {
    /// The peer ID this endpoint registered under.
    #[must_use]
    pub fn local_peer(&self) -> PeerId {
        self.local
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, peer: PeerId, bytes: Vec<u8>, reliable: bool) -> Result<(), TransportError> {
        trace!(from = %self.local, to = %peer, len = bytes.len(), reliable, "memory send");
        self.network
            .deliver(peer, TransportEvent::DataReceived(self.local, bytes))
    }
}
