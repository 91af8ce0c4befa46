//! The endpoint capability: what both replication sides look like to the
//! transport layer.
//!
//! Server and client implement the same three callbacks; everything that
//! differs between them lives behind this trait. The transport's events
//! are queued ([`EventQueue`]) and fed through [`pump`] on the tick thread,
//! so callbacks always run single-threaded against the store.

use drift_protocol::{EventQueue, PeerId, TransportEvent};

/// Connect/disconnect/data callbacks, applied on the tick thread.
pub trait Endpoint {
    /// A peer completed the transport handshake.
    fn on_connect(&mut self, peer: PeerId);

    /// A peer is gone; all its state must be released.
    fn on_disconnect(&mut self, peer: PeerId);

    /// A byte payload arrived from a peer. Undecodable payloads are dropped
    /// and logged, never fatal.
    fn on_data(&mut self, peer: PeerId, bytes: &[u8]);
}

/// Drain `queue` and apply every event to `endpoint` in arrival order.
///
/// Called once per tick at the endpoint's defined drain point.
pub fn pump<E: Endpoint>(endpoint: &mut E, queue: &mut EventQueue) {
    for event in queue.drain() {
        match event {
            TransportEvent::Connected(peer) => endpoint.on_connect(peer),
            TransportEvent::Disconnected(peer) => endpoint.on_disconnect(peer),
            TransportEvent::DataReceived(peer, bytes) => endpoint.on_data(peer, &bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use drift_protocol::event_queue;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        log: Vec<String>,
    }

    impl Endpoint for Recorder {
        fn on_connect(&mut self, peer: PeerId) {
            self.log.push(format!("connect {peer}"));
        }

        fn on_disconnect(&mut self, peer: PeerId) {
            self.log.push(format!("disconnect {peer}"));
        }

        fn on_data(&mut self, peer: PeerId, bytes: &[u8]) {
            self.log.push(format!("data {peer} {}", bytes.len()));
        }
    }

    #[test]
    fn test_pump_applies_in_arrival_order() {
        let (sender, mut queue) = event_queue();
        sender.send(TransportEvent::Connected(PeerId(3))).unwrap();
        sender
            .send(TransportEvent::DataReceived(PeerId(3), vec![0; 4]))
            .unwrap();
        sender.send(TransportEvent::Disconnected(PeerId(3))).unwrap();

        let mut recorder = Recorder::default();
        pump(&mut recorder, &mut queue);
        assert_eq!(
            recorder.log,
            vec!["connect peer-3", "data peer-3 4", "disconnect peer-3"]
        );
    }
}
