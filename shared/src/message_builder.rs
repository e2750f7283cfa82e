//! Fluent assembly of a [`Message`]

use crate::error::BuildError;
use crate::message::{Message, MessageHeader, MessageType};
use log::warn;

/// Collects header fields and body bytes for one outbound message.
///
/// `salt`, the two ids and the ack pair are required; `build` reports the
/// first one that was never set. Body and padding default to empty.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message_type: MessageType,
    salt: Option<u64>,
    sequence_id: Option<u32>,
    message_id: Option<u32>,
    ack: Option<u32>,
    ack_bitfield: Option<u32>,
    padding: usize,
    body: Vec<u8>,
}

impl MessageBuilder {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            salt: None,
            sequence_id: None,
            message_id: None,
            ack: None,
            ack_bitfield: None,
            padding: 0,
            body: Vec::new(),
        }
    }

    pub fn with_salt(mut self, salt: u64) -> Self {
        self.salt = Some(salt);
        self
    }

    pub fn with_ids(mut self, sequence_id: u32, message_id: u32) -> Self {
        self.sequence_id = Some(sequence_id);
        self.message_id = Some(message_id);
        self
    }

    pub fn with_acks(mut self, ack: u32, ack_bitfield: u32) -> Self {
        self.ack = Some(ack);
        self.ack_bitfield = Some(ack_bitfield);
        self
    }

    /// Appends `padding` zero bytes after the body
    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }

    pub fn build(self) -> Result<Message, BuildError> {
        let salt = required(self.salt, "salt")?;
        let sequence_id = required(self.sequence_id, "sequence_id")?;
        let message_id = required(self.message_id, "message_id")?;
        let ack = required(self.ack, "ack")?;
        let ack_bitfield = required(self.ack_bitfield, "ack_bitfield")?;

        let mut body = self.body;
        body.resize(body.len() + self.padding, 0);

        Ok(Message {
            header: MessageHeader {
                salt,
                sequence_id,
                ack,
                ack_bitfield,
                message_id,
                message_type: self.message_type,
                body_size: body.len() as u32,
            },
            body,
        })
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, BuildError> {
    value.ok_or_else(|| {
        warn!("Message build failed: required field `{}` was not specified", field);
        BuildError::MissingField(field)
    })
}
