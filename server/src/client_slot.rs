//! Server-side session state for one connected client
//!
//! The server allocates a fixed pool of slots up front. A slot is never
//! destroyed; it moves through
//!
//! ```text
//! Disconnected -(bind)-> Connecting -(accept)-> Connected -(timeout | disconnect)-> Disconnected
//! ```
//!
//! and is rebound for the next client that asks to connect.

use log::{debug, info, warn};
use shared::{roll_salt, ConnectionStatus, Message, OutboundQueue, Salts, SendError, Sender};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// One entry of the server's connection pool
///
/// Each slot owns:
/// - A `Sender` targeted at the bound client, carrying the session salts
///   and reliability counters
/// - An inbound FIFO of accepted `UserInputs` and `Ping` messages
/// - The time of the last accepted message, for timeout detection
#[derive(Debug)]
pub struct ClientSlot {
    index: u8,
    status: ConnectionStatus,
    sender: Sender,
    queue: VecDeque<Message>,
    last_message: Instant,
    timeout: Duration,
}

impl ClientSlot {
    /// Creates a disconnected slot whose sender feeds the server's outbound queue
    pub fn new(index: u8, outbound: OutboundQueue, timeout: Duration) -> Self {
        Self {
            index,
            status: ConnectionStatus::Disconnected,
            sender: Sender::new(outbound),
            queue: VecDeque::new(),
            last_message: Instant::now(),
            timeout,
        }
    }

    /// Binds the slot to a client that asked to connect
    ///
    /// Rolls a fresh server salt, resets the sender's counters, drops any
    /// messages left over from the previous occupant and starts the timeout
    /// clock. The slot is `Connecting` until the challenge is answered.
    pub fn bind(&mut self, endpoint: SocketAddr, client_salt: u64) {
        let server_salt = roll_salt();
        debug!("Slot {} rolled server salt {:#018x}", self.index, server_salt);

        self.sender.bind(endpoint, Salts::new(client_salt, server_salt));
        self.status = ConnectionStatus::Connecting;
        self.queue.clear();
        self.last_message = Instant::now();
    }

    /// Sends the server salt to the bound client
    pub fn challenge(&mut self) -> Result<(), SendError> {
        self.sender.write_challenge()
    }

    /// Marks the slot connected and tells the client its index
    ///
    /// Calling this on an already connected slot re-sends the acceptance,
    /// which covers a lost `ConnectionAccepted`.
    pub fn accept(&mut self) -> Result<(), SendError> {
        if self.status != ConnectionStatus::Connected {
            info!(
                "Client {:?} accepted into slot {}",
                self.sender.endpoint(),
                self.index
            );
        }
        self.status = ConnectionStatus::Connected;
        self.last_message = Instant::now();
        self.sender.write_connection_accepted(self.index)
    }

    /// Queues a message if its sequence id is newer than anything seen so far
    ///
    /// Stale and duplicate messages are dropped and do not refresh the
    /// timeout clock.
    pub fn add_message(&mut self, message: Message) -> bool {
        if !self.sender.update_acks(message.header.sequence_id) {
            debug!(
                "Slot {} dropped stale message #{}",
                self.index, message.header.sequence_id
            );
            return false;
        }

        self.queue.push_back(message);
        self.last_message = Instant::now();
        true
    }

    pub fn next_message(&mut self) -> Option<Message> {
        self.queue.pop_front()
    }

    pub fn pending_messages(&self) -> usize {
        self.queue.len()
    }

    pub fn maybe_timeout(&mut self) -> bool {
        self.maybe_timeout_at(Instant::now())
    }

    /// Disconnects the client if nothing was accepted from it for longer than
    /// the timeout. Returns true only when an active session was dropped.
    pub fn maybe_timeout_at(&mut self, now: Instant) -> bool {
        if self.status == ConnectionStatus::Disconnected {
            return false;
        }

        if now.saturating_duration_since(self.last_message) > self.timeout {
            info!("Slot {} timed out", self.index);
            self.disconnect();
            return true;
        }

        false
    }

    /// Notifies the client and frees the slot. Sends at most one
    /// `Disconnected` per session.
    pub fn disconnect(&mut self) {
        if self.status == ConnectionStatus::Disconnected {
            return;
        }

        if let Err(e) = self.sender.write_disconnected() {
            warn!("Slot {} failed to send disconnect: {}", self.index, e);
        }
        self.release();
    }

    /// Frees the slot without notifying the client
    pub fn release(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.queue.clear();
    }

    pub fn ping(&mut self) -> Result<(), SendError> {
        if !self.is_connected() {
            return Ok(());
        }
        self.sender.write_ping()
    }

    pub fn send_world_state(&mut self, serialized_state: &[u8]) -> Result<(), SendError> {
        if !self.is_connected() {
            return Ok(());
        }
        self.sender.write_world_state(serialized_state)
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn is_free(&self) -> bool {
        self.status == ConnectionStatus::Disconnected
    }

    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.sender.endpoint()
    }

    pub fn salts(&self) -> Salts {
        self.sender.salts()
    }

    /// True if this slot holds a live session for `endpoint` under `xor_salt`
    pub fn owns(&self, endpoint: SocketAddr, xor_salt: u64) -> bool {
        !self.is_free() && self.sender.connected_to(endpoint) && self.sender.matches_xor_salt(xor_salt)
    }

    /// True if this slot holds a live session started by `endpoint` with `client_salt`
    pub fn owns_request(&self, endpoint: SocketAddr, client_salt: u64) -> bool {
        !self.is_free()
            && self.sender.connected_to(endpoint)
            && self.sender.matches_client_salt(client_salt)
    }

    pub fn matches_server_salt(&self, server_salt: u64) -> bool {
        self.sender.salts().server == server_salt
    }
}
