//! Packet and message framing
//!
//! A datagram carries exactly one packet:
//!
//! ```text
//! PacketHeader  := protocol_id:u32 | checksum:u32
//! MessageHeader := salt:u64 | sequence_id:u32 | ack:u32 | ack_bitfield:u32
//!                | message_id:u32 | message_type:u8 | body_size:u32
//! Body          := body_size bytes
//! ```
//!
//! The checksum covers everything after the packet header. All integers are
//! big-endian.

use crate::checksum::checksum;
use crate::error::{ProtocolError, WireError};
use crate::serialize::{
    deserialize_u32, deserialize_u64, deserialize_u8, serialize_u32, serialize_u64, serialize_u8,
};
use crate::PROTOCOL_ID;

/// Body length of `ConnectionRequested` and `ChallengeResponse`. A request
/// must cost the client at least as many bytes as the server's reply.
pub const CONNECTION_PADDING: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    // client -> server
    Disconnected = 0,
    Ping = 1,
    ConnectionRequested = 2,
    ChallengeResponse = 3,
    UserInputs = 4,

    // server -> client
    ConnectionAccepted = 5,
    ConnectionDenied = 6,
    Challenge = 7,
    WorldSnapshot = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => MessageType::Disconnected,
            1 => MessageType::Ping,
            2 => MessageType::ConnectionRequested,
            3 => MessageType::ChallengeResponse,
            4 => MessageType::UserInputs,
            5 => MessageType::ConnectionAccepted,
            6 => MessageType::ConnectionDenied,
            7 => MessageType::Challenge,
            8 => MessageType::WorldSnapshot,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub protocol_id: u32,
    pub checksum: u32,
}

impl PacketHeader {
    pub const SIZE: usize = 8;

    pub fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            protocol_id: deserialize_u32(buf)?,
            checksum: deserialize_u32(buf)?,
        })
    }

    pub fn encode_into(&self, buf: &mut [u8], offset: usize) -> Result<usize, WireError> {
        let offset = serialize_u32(self.protocol_id, buf, offset)?;
        serialize_u32(self.checksum, buf, offset)
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[..4].copy_from_slice(&self.protocol_id.to_be_bytes());
        bytes[4..].copy_from_slice(&self.checksum.to_be_bytes());
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// `client_salt ^ server_salt` of the session this message belongs to
    pub salt: u64,
    pub sequence_id: u32,
    pub ack: u32,
    pub ack_bitfield: u32,
    pub message_id: u32,
    pub message_type: MessageType,
    pub body_size: u32,
}

impl MessageHeader {
    /// 8 + 4 + 4 + 4 + 4 + 1 + 4
    pub const SIZE: usize = 29;

    pub fn encode_into(&self, buf: &mut [u8], offset: usize) -> Result<usize, WireError> {
        if buf.len() < offset.saturating_add(Self::SIZE) {
            return Err(WireError::BufferTooSmall {
                needed: Self::SIZE,
                available: buf.len().saturating_sub(offset),
            });
        }

        let offset = serialize_u64(self.salt, buf, offset)?;
        let offset = serialize_u32(self.sequence_id, buf, offset)?;
        let offset = serialize_u32(self.ack, buf, offset)?;
        let offset = serialize_u32(self.ack_bitfield, buf, offset)?;
        let offset = serialize_u32(self.message_id, buf, offset)?;
        let offset = serialize_u8(self.message_type as u8, buf, offset)?;
        serialize_u32(self.body_size, buf, offset)
    }

    /// Appends the big-endian header to `buf`
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.salt.to_be_bytes());
        buf.extend_from_slice(&self.sequence_id.to_be_bytes());
        buf.extend_from_slice(&self.ack.to_be_bytes());
        buf.extend_from_slice(&self.ack_bitfield.to_be_bytes());
        buf.extend_from_slice(&self.message_id.to_be_bytes());
        buf.push(self.message_type as u8);
        buf.extend_from_slice(&self.body_size.to_be_bytes());
    }

    pub fn decode(buf: &mut &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(WireError::BufferTooSmall {
                needed: Self::SIZE,
                available: buf.len(),
            }
            .into());
        }

        Ok(Self {
            salt: deserialize_u64(buf)?,
            sequence_id: deserialize_u32(buf)?,
            ack: deserialize_u32(buf)?,
            ack_bitfield: deserialize_u32(buf)?,
            message_id: deserialize_u32(buf)?,
            message_type: MessageType::try_from(deserialize_u8(buf)?)?,
            body_size: deserialize_u32(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub body: Vec<u8>,
}

impl Message {
    /// Anything smaller than a packet header plus an empty message is discarded
    pub const fn min_required_size() -> usize {
        PacketHeader::SIZE + MessageHeader::SIZE
    }

    pub fn packed_size(&self) -> usize {
        MessageHeader::SIZE + self.body.len()
    }

    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    pub fn encode_into(&self, buf: &mut [u8], offset: usize) -> Result<usize, WireError> {
        let end = offset.saturating_add(self.packed_size());
        if buf.len() < end {
            return Err(WireError::BufferTooSmall {
                needed: self.packed_size(),
                available: buf.len().saturating_sub(offset),
            });
        }

        let offset = self.header.encode_into(buf, offset)?;
        buf[offset..end].copy_from_slice(&self.body);
        Ok(end)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.packed_size());
        self.header.write_to(&mut buf);
        buf.extend_from_slice(&self.body);
        buf
    }

    /// Decodes a message from the bytes following the packet header. The
    /// slice must hold exactly one header and `body_size` body bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut cursor = buf;
        let header = MessageHeader::decode(&mut cursor)?;

        if header.body_size as usize != cursor.len() {
            return Err(ProtocolError::BodySizeMismatch {
                declared: header.body_size,
                actual: cursor.len(),
            });
        }

        Ok(Self {
            header,
            body: cursor.to_vec(),
        })
    }

    /// Full datagram: packet header (protocol id + CRC32) followed by the message
    pub fn to_packet(&self) -> Vec<u8> {
        let message = self.encode();
        let header = PacketHeader {
            protocol_id: PROTOCOL_ID,
            checksum: checksum(&message),
        };

        let mut packet = Vec::with_capacity(PacketHeader::SIZE + message.len());
        packet.extend_from_slice(&header.to_bytes());
        packet.extend_from_slice(&message);
        packet
    }
}

/// Checks size, protocol id and checksum of a raw datagram. On success the
/// bytes after `PacketHeader::SIZE` hold a serialized `Message`.
pub fn verify_packet(raw: &[u8]) -> Result<(), ProtocolError> {
    if raw.len() < Message::min_required_size() {
        return Err(ProtocolError::TooShort {
            len: raw.len(),
            min: Message::min_required_size(),
        });
    }

    let mut cursor = raw;
    let header = PacketHeader::decode(&mut cursor)?;
    if header.protocol_id != PROTOCOL_ID {
        return Err(ProtocolError::UnknownProtocol(header.protocol_id));
    }

    let expected = checksum(cursor);
    if header.checksum != expected {
        return Err(ProtocolError::ChecksumMismatch {
            received: header.checksum,
            expected,
        });
    }

    Ok(())
}

/// Verifies and decodes a raw datagram in one step
pub fn decode_packet(raw: &[u8]) -> Result<Message, ProtocolError> {
    verify_packet(raw)?;
    Message::decode(&raw[PacketHeader::SIZE..])
}
