//! Protocol-layer error types.

use crate::transport::PeerId;

/// Failed to encode an outgoing packet.
#[derive(Debug, thiserror::Error)]
#[error("failed to encode packet payload: {0}")]
pub struct EncodeError(#[from] pub(crate) rmp_serde::encode::Error);

/// Failed to decode an inbound payload.
///
/// All decode failures are recoverable per-message: the receiver drops the
/// single message and keeps the session alive.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The leading type tag is not a known [`PacketType`](crate::PacketType).
    /// Stale peers can legitimately send these; never treat as fatal.
    #[error("unknown packet type tag {0}")]
    UnknownType(u8),

    /// The buffer ended before the payload the tag demands was complete.
    #[error("packet truncated")]
    Truncated,

    /// The payload bytes do not decode to the shape the tag demands.
    #[error("invalid packet field: {0}")]
    InvalidField(String),
}

/// Transport send/queue failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No route to the peer (never connected, or already gone).
    #[error("peer {0} is not connected")]
    PeerNotConnected(PeerId),

    /// The event channel to the tick thread is closed.
    #[error("transport channel closed")]
    ChannelClosed,
}
