//! Tag-first packet codec.
//!
//! [`encode`] writes the one-byte [`PacketType`] tag followed by the
//! MessagePack encoding of the payload; [`decode`] validates the tag before
//! touching the body. MessagePack length fields are checked against the
//! remaining buffer by the decoder, so a hostile declared length fails with
//! a decode error instead of reading past the buffer.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{DecodeError, EncodeError};
use crate::messages::{
    AddNewEntities, CarEntityId, ChatMessage, ClientInput, DestroyedEntities, DesyncReport,
    OnlyComponentUpdate, Ping, ReplaceAllEntities, SetupSession, SnapshotAck, SpawnParticle,
};
use crate::packet::{Packet, PacketType};

/// Encode a packet to wire bytes: tag byte first, MessagePack body after.
///
/// # Errors
///
/// Returns [`EncodeError`] if payload serialisation fails.
pub fn encode(packet: &Packet) -> Result<Vec<u8>, EncodeError> {
    let mut buf = vec![packet.packet_type().tag()];
    match packet {
        Packet::Ping(body) => write_body(&mut buf, body)?,
        Packet::Message(body) => write_body(&mut buf, body)?,
        Packet::SetupSession(body) => write_body(&mut buf, body)?,
        Packet::CarEntityId(body) => write_body(&mut buf, body)?,
        Packet::ClientInput(body) => write_body(&mut buf, body)?,
        Packet::ReplaceAllEntities(body) => write_body(&mut buf, body)?,
        Packet::OnlyComponentUpdate(body) => write_body(&mut buf, body)?,
        Packet::AddNewEntities(body) => write_body(&mut buf, body)?,
        Packet::DestroyedEntities(body) => write_body(&mut buf, body)?,
        Packet::SpawnParticle(body) => write_body(&mut buf, body)?,
        Packet::SnapshotAck(body) => write_body(&mut buf, body)?,
        Packet::DesyncReport(body) => write_body(&mut buf, body)?,
    }
    Ok(buf)
}

/// Decode wire bytes into a typed packet.
///
/// # Errors
///
/// - [`DecodeError::Truncated`] on an empty buffer or a body shorter than
///   the tag demands.
/// - [`DecodeError::UnknownType`] for an unrecognised tag (stale peers can
///   send these; the caller drops the message and keeps the session).
/// - [`DecodeError::InvalidField`] when the body does not decode to the
///   payload shape.
pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
    let (&tag, body) = bytes.split_first().ok_or(DecodeError::Truncated)?;
    let packet_type = PacketType::from_tag(tag).ok_or(DecodeError::UnknownType(tag))?;
    match packet_type {
        PacketType::Unknown => Err(DecodeError::UnknownType(tag)),
        PacketType::Ping => Ok(Packet::Ping(read_body::<Ping>(body)?)),
        PacketType::Message => Ok(Packet::Message(read_body::<ChatMessage>(body)?)),
        PacketType::SetupSession => Ok(Packet::SetupSession(read_body::<SetupSession>(body)?)),
        PacketType::CarEntityId => Ok(Packet::CarEntityId(read_body::<CarEntityId>(body)?)),
        PacketType::ClientInput => Ok(Packet::ClientInput(read_body::<ClientInput>(body)?)),
        PacketType::ReplaceAllEntities => Ok(Packet::ReplaceAllEntities(
            read_body::<ReplaceAllEntities>(body)?,
        )),
        PacketType::OnlyComponentUpdate => Ok(Packet::OnlyComponentUpdate(
            read_body::<OnlyComponentUpdate>(body)?,
        )),
        PacketType::AddNewEntities => {
            Ok(Packet::AddNewEntities(read_body::<AddNewEntities>(body)?))
        }
        PacketType::DestroyedEntities => Ok(Packet::DestroyedEntities(
            read_body::<DestroyedEntities>(body)?,
        )),
        PacketType::SpawnParticle => Ok(Packet::SpawnParticle(read_body::<SpawnParticle>(body)?)),
        PacketType::SnapshotAck => Ok(Packet::SnapshotAck(read_body::<SnapshotAck>(body)?)),
        PacketType::DesyncReport => Ok(Packet::DesyncReport(read_body::<DesyncReport>(body)?)),
    }
}

fn write_body<T: Serialize>(buf: &mut Vec<u8>, body: &T) -> Result<(), EncodeError> {
    rmp_serde::encode::write_named(buf, body)?;
    Ok(())
}

fn read_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, DecodeError> {
    rmp_serde::from_slice(body).map_err(map_decode_error)
}

/// Split incomplete-buffer failures from malformed-field failures so the
/// caller can tell a short read from garbage.
fn map_decode_error(err: rmp_serde::decode::Error) -> DecodeError {
    use rmp_serde::decode::Error as Rmp;
    match &err {
        Rmp::InvalidMarkerRead(io) | Rmp::InvalidDataRead(io)
            if io.kind() == std::io::ErrorKind::UnexpectedEof =>
        {
            DecodeError::Truncated
        }
        _ => DecodeError::InvalidField(err.to_string()),
    }
}
