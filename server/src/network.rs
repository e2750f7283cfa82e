//! Server network layer: slot pool, handshake routing and the reactor

use crate::client_slot::ClientSlot;
use log::{debug, error, info, warn};
use shared::serialize::deserialize_u64;
use shared::{
    lock, ConnectionStatus, Datagram, Endpoint, Listener, Message, MessageHandler, NetConfig,
    OutboundQueue, Reactor, Salts, Sender, WorldState, CONNECTION_PADDING,
};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

/// State shared between the reactor thread (handler callbacks) and the game
/// loop (public `Server` API)
pub struct ServerState {
    slots: Mutex<Vec<ClientSlot>>,
    /// Answers requests that find no free slot; rebound per denial
    denier: Mutex<Sender>,
    new_clients: Mutex<VecDeque<u8>>,
    disconnected_clients: Mutex<VecDeque<u8>>,
}

impl ServerState {
    pub fn new(config: &NetConfig, outbound: &OutboundQueue) -> Self {
        let slots = (0..config.max_clients)
            .map(|index| ClientSlot::new(index, outbound.clone(), config.timeout))
            .collect();

        Self {
            slots: Mutex::new(slots),
            denier: Mutex::new(Sender::new(outbound.clone())),
            new_clients: Mutex::new(VecDeque::new()),
            disconnected_clients: Mutex::new(VecDeque::new()),
        }
    }

    fn deny(&self, remote: SocketAddr, client_salt: u64) {
        warn!("No free slot for {}, denying connection", remote);

        let mut denier = lock(&self.denier);
        denier.bind(remote, Salts::new(client_salt, 0));
        if let Err(e) = denier.write_connection_denied() {
            error!("Failed to deny {}: {}", remote, e);
        }
    }

    /// Routes a message to the connected slot owning `remote` and its salt
    fn forward_to_slot(&self, message: &Message, remote: SocketAddr) {
        let mut slots = lock(&self.slots);
        match slots
            .iter_mut()
            .find(|slot| slot.is_connected() && slot.owns(remote, message.header.salt))
        {
            Some(slot) => {
                slot.add_message(message.clone());
            }
            None => debug!(
                "Ignoring {:?} from unknown session at {}",
                message.message_type(),
                remote
            ),
        }
    }
}

impl MessageHandler for ServerState {
    fn on_connection_requested(&self, message: &Message, remote: SocketAddr) {
        if message.body.len() < CONNECTION_PADDING {
            debug!(
                "Dropping unpadded connection request from {} ({} bytes)",
                remote,
                message.body.len()
            );
            return;
        }

        let client_salt = message.header.salt;
        let mut slots = lock(&self.slots);

        if let Some(slot) = slots
            .iter_mut()
            .find(|slot| slot.owns_request(remote, client_salt))
        {
            if slot.connection_status() == ConnectionStatus::Connecting {
                debug!("Repeated request from {}, re-sending challenge", remote);
                if let Err(e) = slot.challenge() {
                    error!("Failed to challenge {}: {}", remote, e);
                }
            }
            return;
        }

        let Some(free) = slots.iter().position(ClientSlot::is_free) else {
            drop(slots);
            self.deny(remote, client_salt);
            return;
        };

        let slot = &mut slots[free];
        info!("Connection request from {}, binding slot {}", remote, slot.index());
        slot.bind(remote, client_salt);
        if let Err(e) = slot.challenge() {
            error!("Failed to challenge {}: {}", remote, e);
        }
    }

    fn on_challenge_response(&self, message: &Message, remote: SocketAddr) {
        if message.body.len() < CONNECTION_PADDING {
            debug!(
                "Dropping unpadded challenge response from {} ({} bytes)",
                remote,
                message.body.len()
            );
            return;
        }

        let mut body = message.body.as_slice();
        let Ok(echoed_salt) = deserialize_u64(&mut body) else {
            debug!("Challenge response from {} has no salt", remote);
            return;
        };

        let accepted = {
            let mut slots = lock(&self.slots);
            let Some(slot) = slots
                .iter_mut()
                .find(|slot| slot.owns(remote, message.header.salt))
            else {
                debug!("Challenge response from {} matches no slot", remote);
                return;
            };

            if !slot.matches_server_salt(echoed_salt) {
                warn!("Challenge response from {} echoed the wrong salt", remote);
                return;
            }

            let was_connecting = slot.connection_status() == ConnectionStatus::Connecting;
            if let Err(e) = slot.accept() {
                error!("Failed to accept {}: {}", remote, e);
            }
            was_connecting.then(|| slot.index())
        };

        if let Some(index) = accepted {
            lock(&self.new_clients).push_back(index);
        }
    }

    fn on_user_inputs(&self, message: &Message, remote: SocketAddr) {
        self.forward_to_slot(message, remote);
    }

    fn on_ping(&self, message: &Message, remote: SocketAddr) {
        self.forward_to_slot(message, remote);
    }

    fn on_disconnected(&self, message: &Message, remote: SocketAddr) {
        let released = {
            let mut slots = lock(&self.slots);
            slots
                .iter_mut()
                .find(|slot| slot.owns(remote, message.header.salt))
                .map(|slot| {
                    slot.release();
                    slot.index()
                })
        };

        match released {
            Some(index) => {
                info!("Client in slot {} disconnected", index);
                lock(&self.disconnected_clients).push_back(index);
            }
            None => debug!("Disconnect from unknown session at {}", remote),
        }
    }
}

/// Authoritative end of the transport
///
/// Owns the slot pool and one UDP socket. `begin` starts the reactor thread
/// that receives and routes messages; everything else is called from the
/// game loop.
pub struct Server {
    state: Arc<ServerState>,
    outbound: Option<UnboundedReceiver<Datagram>>,
    endpoint: Option<Endpoint>,
    reactor: Option<Reactor>,
    local_addr: SocketAddr,
    max_clients: u8,
}

impl Server {
    /// Binds the listening socket. Nothing is received until `begin`.
    pub fn new(config: &NetConfig) -> io::Result<Self> {
        let endpoint = Endpoint::bind(config.server_bind_addr())?;
        let local_addr = endpoint.local_addr()?;
        let (queue, outbound) = OutboundQueue::new();

        info!(
            "Server bound to {} with {} slots",
            local_addr, config.max_clients
        );

        Ok(Self {
            state: Arc::new(ServerState::new(config, &queue)),
            outbound: Some(outbound),
            endpoint: Some(endpoint),
            reactor: None,
            local_addr,
            max_clients: config.max_clients,
        })
    }

    /// Starts receiving on the reactor thread
    pub fn begin(&mut self) -> io::Result<()> {
        let (Some(endpoint), Some(outbound)) = (self.endpoint.take(), self.outbound.take()) else {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "server has already been started",
            ));
        };

        let handler: Arc<dyn MessageHandler> = self.state.clone();
        let listener = Listener::new(Arc::downgrade(&handler));
        self.reactor = Some(Reactor::start(endpoint, listener, outbound, "server-reactor")?);

        info!("Server listening on {}", self.local_addr);
        Ok(())
    }

    /// Disconnects every client, flushes the goodbyes and stops the reactor
    pub fn shutdown(&mut self) {
        let Some(mut reactor) = self.reactor.take() else {
            return;
        };

        for slot in lock(&self.state.slots).iter_mut() {
            slot.disconnect();
        }
        reactor.shutdown();
        info!("Server stopped");
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn max_clients(&self) -> u8 {
        self.max_clients
    }

    /// Index of a client that finished the handshake since the last call
    pub fn next_new_client(&self) -> Option<u8> {
        lock(&self.state.new_clients).pop_front()
    }

    /// Index of a client that left or timed out since the last call
    pub fn next_disconnected_client(&self) -> Option<u8> {
        lock(&self.state.disconnected_clients).pop_front()
    }

    pub fn next_message(&self, index: u8) -> Option<Message> {
        lock(&self.state.slots)
            .get_mut(usize::from(index))
            .and_then(ClientSlot::next_message)
    }

    pub fn connection_status(&self, index: u8) -> Option<ConnectionStatus> {
        lock(&self.state.slots)
            .get(usize::from(index))
            .map(ClientSlot::connection_status)
    }

    pub fn connected_count(&self) -> usize {
        lock(&self.state.slots)
            .iter()
            .filter(|slot| slot.is_connected())
            .count()
    }

    pub fn ping_all(&self) {
        for slot in lock(&self.state.slots).iter_mut() {
            if let Err(e) = slot.ping() {
                warn!("Failed to ping slot {}: {}", slot.index(), e);
            }
        }
    }

    /// Broadcasts a snapshot to every connected client
    pub fn send_world_state(&self, world: &WorldState) -> bincode::Result<()> {
        let bytes = world.to_bytes()?;

        for slot in lock(&self.state.slots).iter_mut() {
            if let Err(e) = slot.send_world_state(&bytes) {
                warn!("Failed to send snapshot to slot {}: {}", slot.index(), e);
            }
        }
        Ok(())
    }

    /// Drops every session that went silent. The returned indices are also
    /// reported by `next_disconnected_client`.
    pub fn maybe_timeout_all(&self) -> Vec<u8> {
        let timed_out: Vec<u8> = lock(&self.state.slots)
            .iter_mut()
            .filter_map(|slot| slot.maybe_timeout().then(|| slot.index()))
            .collect();

        lock(&self.state.disconnected_clients).extend(timed_out.iter().copied());
        timed_out
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}
