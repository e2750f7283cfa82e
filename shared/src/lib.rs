//! # Shared Transport Library
//!
//! The reliable-UDP protocol spoken by the game client and the authoritative
//! server. Both binaries link this crate; everything that has to agree
//! byte-for-byte on either side of the wire lives here.
//!
//! ## Layers, leaf first
//!
//! - [`serialize`]: big-endian codec for fixed-width integers and floats
//! - [`checksum`]: CRC32 over a byte range
//! - [`message`]: packet and message headers, framing and verification
//! - [`message_builder`]: fluent construction of outbound messages
//! - [`sender`]: per-session salts, sequence ids and acks, one `write_*` per
//!   message type
//! - [`listener`]: receive loop that verifies datagrams and dispatches them
//!   to a [`MessageHandler`]
//! - [`transport`]: the socket and the reactor thread that drives it
//!
//! [`world`] holds the two game payloads that ride inside messages and
//! [`config`] the network settings shared by both binaries.
//!
//! ## Handshake
//!
//! ```text
//! client                                   server
//!   | ConnectionRequested (512 B, salt C)    |
//!   |--------------------------------------->|  bind slot, roll salt S
//!   |             Challenge (S, salt C^S)    |
//!   |<---------------------------------------|
//!   | ChallengeResponse (S + pad, salt C^S)  |
//!   |--------------------------------------->|  accept
//!   |  ConnectionAccepted (index, salt C^S)  |
//!   |<---------------------------------------|
//! ```
//!
//! The padded request keeps the server from replying with more bytes than it
//! received.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod checksum;
pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod message;
pub mod message_builder;
pub mod message_queue;
pub mod sender;
pub mod serialize;
pub mod transport;
pub mod world;

pub use config::NetConfig;
pub use error::{BuildError, ProtocolError, SendError, WireError};
pub use handler::MessageHandler;
pub use listener::{dispatch, Listener};
pub use message::{
    decode_packet, verify_packet, Message, MessageHeader, MessageType, PacketHeader,
    CONNECTION_PADDING,
};
pub use message_builder::MessageBuilder;
pub use message_queue::MessageQueue;
pub use sender::{roll_salt, Salts, Sender};
pub use transport::{Datagram, Endpoint, OutboundQueue, Reactor};
pub use world::{InputState, PlayerPosition, WorldState};

/// Identifies this protocol in every packet header
pub const PROTOCOL_ID: u32 = 0x4E45_5431;

/// Largest datagram either side will send
pub const MAX_PACKET_SIZE: usize = 1200;

/// Lifecycle of one connection, seen from either end
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Locks a mutex, recovering the data if a previous holder panicked
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_id_is_nonzero() {
        assert_ne!(PROTOCOL_ID, 0);
    }

    #[test]
    fn test_default_status_is_disconnected() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_lock_recovers_from_poison() {
        let mutex = std::sync::Arc::new(Mutex::new(1));
        let poisoner = std::sync::Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the mutex");
        })
        .join();

        assert!(mutex.is_poisoned());
        *lock(&mutex) += 1;
        assert_eq!(*lock(&mutex), 2);
    }
}
