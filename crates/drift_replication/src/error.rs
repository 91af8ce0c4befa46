//! Replication-layer error types.

use drift_protocol::{EncodeError, PeerId, TransportError};

/// Errors surfaced by the replication layer's caller-facing operations.
///
/// Per-message decode failures and per-entity serialisation failures are
/// handled with skip-and-log inside the tick pass and never reach this
/// type; what remains is operations the game loop invokes directly, where
/// the caller can act on the failure.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// Outgoing packet could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Transport refused the send.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The peer is not known to this endpoint.
    #[error("no session for peer {0}")]
    UnknownPeer(PeerId),
}
