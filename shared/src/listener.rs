//! Inbound half of the transport: receive, verify, decode, route

use crate::error::ProtocolError;
use crate::handler::MessageHandler;
use crate::message::{decode_packet, MessageType};
use log::{debug, error, warn};
use std::net::SocketAddr;
use std::sync::Weak;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Large enough for any datagram a peer may legitimately send
const RECEIVE_BUFFER_SIZE: usize = 2048;

pub struct Listener {
    handler: Weak<dyn MessageHandler>,
    buffer: Box<[u8; RECEIVE_BUFFER_SIZE]>,
}

impl Listener {
    pub fn new(handler: Weak<dyn MessageHandler>) -> Self {
        Self {
            handler,
            buffer: Box::new([0u8; RECEIVE_BUFFER_SIZE]),
        }
    }

    /// Receives until the handler's owner is dropped. Every datagram rearms
    /// the receive, whether it was dispatched or rejected.
    pub async fn run(&mut self, socket: &UdpSocket) {
        loop {
            let (len, remote) = match socket.recv_from(&mut self.buffer[..]).await {
                Ok(received) => received,
                Err(e) => {
                    error!("Error receiving datagram: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            let Some(handler) = self.handler.upgrade() else {
                debug!("Message handler dropped, listener stopping");
                return;
            };

            if let Err(e) = dispatch(handler.as_ref(), &self.buffer[..len], remote) {
                warn!("Dropped {} byte datagram from {}: {}", len, remote, e);
            }
        }
    }
}

/// Verifies `raw`, decodes the message and hands it to the matching callback
pub fn dispatch(
    handler: &dyn MessageHandler,
    raw: &[u8],
    remote: SocketAddr,
) -> Result<MessageType, ProtocolError> {
    let message = decode_packet(raw)?;

    match message.message_type() {
        MessageType::Disconnected => handler.on_disconnected(&message, remote),
        MessageType::Ping => handler.on_ping(&message, remote),
        MessageType::ConnectionRequested => handler.on_connection_requested(&message, remote),
        MessageType::ChallengeResponse => handler.on_challenge_response(&message, remote),
        MessageType::UserInputs => handler.on_user_inputs(&message, remote),
        MessageType::ConnectionAccepted => handler.on_connection_accepted(&message, remote),
        MessageType::ConnectionDenied => handler.on_connection_denied(&message, remote),
        MessageType::Challenge => handler.on_challenge(&message, remote),
        MessageType::WorldSnapshot => handler.on_world_snapshot(&message, remote),
    }

    Ok(message.message_type())
}
