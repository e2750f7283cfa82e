//! Outbound half of the transport: one `write_*` per message type

use crate::error::SendError;
use crate::message::{MessageType, CONNECTION_PADDING};
use crate::message_builder::MessageBuilder;
use crate::serialize::{serialize_u64, serialize_u8};
use crate::transport::{Datagram, OutboundQueue};
use crate::world::InputState;
use crate::MAX_PACKET_SIZE;
use log::debug;
use std::net::SocketAddr;

/// Client and server halves of a session's salt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Salts {
    pub client: u64,
    pub server: u64,
}

impl Salts {
    pub fn new(client: u64, server: u64) -> Self {
        Self { client, server }
    }

    /// Carried in every message header
    pub fn xor(&self) -> u64 {
        self.client ^ self.server
    }
}

/// Fresh random salt
pub fn roll_salt() -> u64 {
    rand::random()
}

/// Formats messages for a single remote endpoint and tracks the
/// reliability counters of that session.
///
/// Nothing is sent directly; finished packets are pushed onto the
/// reactor's [`OutboundQueue`], so packets leave in call order.
#[derive(Debug)]
pub struct Sender {
    outbound: OutboundQueue,
    endpoint: Option<SocketAddr>,
    salts: Salts,
    sequence_id: u32,
    message_id: u32,
    ack: u32,
    ack_bitfield: u32,
    received_any: bool,
}

impl Sender {
    /// Unbound sender; every write fails until `bind` is called
    pub fn new(outbound: OutboundQueue) -> Self {
        Self {
            outbound,
            endpoint: None,
            salts: Salts::default(),
            sequence_id: 0,
            message_id: 0,
            ack: 0,
            ack_bitfield: 0,
            received_any: false,
        }
    }

    /// Points the sender at a new session and resets every counter
    pub fn bind(&mut self, endpoint: SocketAddr, salts: Salts) {
        self.endpoint = Some(endpoint);
        self.salts = salts;
        self.sequence_id = 0;
        self.message_id = 0;
        self.ack = 0;
        self.ack_bitfield = 0;
        self.received_any = false;
    }

    /// Replaces the salts but keeps the counters running
    pub fn update_salts(&mut self, salts: Salts) {
        self.salts = salts;
    }

    /// Records an incoming sequence id. Returns false for anything not newer
    /// than the last accepted id; those messages are stale or duplicated.
    pub fn update_acks(&mut self, sequence_id: u32) -> bool {
        if self.received_any && sequence_id <= self.ack {
            return false;
        }

        let gap = if self.received_any {
            sequence_id - self.ack
        } else {
            0
        };
        self.ack = sequence_id;
        self.ack_bitfield = self.ack_bitfield.checked_shl(gap).unwrap_or(0) | 1;
        self.received_any = true;
        true
    }

    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.endpoint
    }

    pub fn salts(&self) -> Salts {
        self.salts
    }

    pub fn sequence_id(&self) -> u32 {
        self.sequence_id
    }

    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    pub fn ack(&self) -> u32 {
        self.ack
    }

    pub fn ack_bitfield(&self) -> u32 {
        self.ack_bitfield
    }

    pub fn connected_to(&self, endpoint: SocketAddr) -> bool {
        self.endpoint == Some(endpoint)
    }

    pub fn matches_client_salt(&self, client_salt: u64) -> bool {
        self.salts.client == client_salt
    }

    pub fn matches_xor_salt(&self, xor_salt: u64) -> bool {
        self.salts.xor() == xor_salt
    }

    pub fn matches_salts(&self, client_salt: u64, server_salt: u64) -> bool {
        self.salts == Salts::new(client_salt, server_salt)
    }

    pub fn write_connection_requested(&mut self) -> Result<(), SendError> {
        self.write(self.scaffold(MessageType::ConnectionRequested).with_padding(CONNECTION_PADDING))
    }

    pub fn write_challenge(&mut self) -> Result<(), SendError> {
        let body = self.server_salt_body()?;
        self.write(self.scaffold(MessageType::Challenge).with_body(&body))
    }

    /// Echoes the server salt, padded to the full connection size
    pub fn write_challenge_response(&mut self) -> Result<(), SendError> {
        let body = self.server_salt_body()?;
        let padding = CONNECTION_PADDING - body.len();
        self.write(
            self.scaffold(MessageType::ChallengeResponse)
                .with_body(&body)
                .with_padding(padding),
        )
    }

    pub fn write_connection_accepted(&mut self, client_index: u8) -> Result<(), SendError> {
        let mut body = [0u8; 1];
        serialize_u8(client_index, &mut body, 0)?;
        self.write(self.scaffold(MessageType::ConnectionAccepted).with_body(&body))
    }

    pub fn write_connection_denied(&mut self) -> Result<(), SendError> {
        self.write(self.scaffold(MessageType::ConnectionDenied))
    }

    pub fn write_disconnected(&mut self) -> Result<(), SendError> {
        self.write(self.scaffold(MessageType::Disconnected))
    }

    pub fn write_ping(&mut self) -> Result<(), SendError> {
        self.write(self.scaffold(MessageType::Ping))
    }

    pub fn write_user_inputs(&mut self, inputs: &InputState) -> Result<(), SendError> {
        self.write(self.scaffold(MessageType::UserInputs).with_body(&inputs.to_bytes()))
    }

    pub fn write_world_state(&mut self, serialized_state: &[u8]) -> Result<(), SendError> {
        self.write(self.scaffold(MessageType::WorldSnapshot).with_body(serialized_state))
    }

    fn server_salt_body(&self) -> Result<[u8; 8], SendError> {
        let mut body = [0u8; 8];
        serialize_u64(self.salts.server, &mut body, 0)?;
        Ok(body)
    }

    fn scaffold(&self, message_type: MessageType) -> MessageBuilder {
        MessageBuilder::new(message_type)
            .with_salt(self.salts.xor())
            .with_ids(self.sequence_id, self.message_id)
            .with_acks(self.ack, self.ack_bitfield)
    }

    fn write(&mut self, builder: MessageBuilder) -> Result<(), SendError> {
        let remote = self.endpoint.ok_or(SendError::Unbound)?;
        let message = builder.build()?;
        let bytes = message.to_packet();

        if bytes.len() > MAX_PACKET_SIZE {
            return Err(SendError::Oversized {
                size: bytes.len(),
                max: MAX_PACKET_SIZE,
            });
        }

        debug!(
            "Queued {:?} #{} ({} bytes) for {}",
            message.message_type(),
            self.sequence_id,
            bytes.len(),
            remote
        );
        self.outbound.push(Datagram { bytes, remote })?;

        self.sequence_id = self.sequence_id.wrapping_add(1);
        self.message_id = self.message_id.wrapping_add(1);
        Ok(())
    }
}
