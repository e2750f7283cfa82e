//! Client network layer: handshake, session state and the reactor

use log::{debug, error, info, warn};
use shared::serialize::{deserialize_u64, deserialize_u8};
use shared::{
    lock, roll_salt, ConnectionStatus, Datagram, Endpoint, InputState, Listener, Message,
    MessageHandler, MessageQueue, NetConfig, OutboundQueue, Reactor, Salts, SendError, Sender,
};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug)]
struct Session {
    status: ConnectionStatus,
    index: Option<u8>,
    sender: Sender,
    last_message: Instant,
}

impl Session {
    fn disconnect(&mut self) {
        if self.status == ConnectionStatus::Disconnected {
            return;
        }

        // Without the server salt no slot can match the notice; the server
        // times the slot out instead
        if self.sender.salts().server == 0 {
            debug!("Leaving before the challenge arrived, no notice sent");
        } else if let Err(e) = self.sender.write_disconnected() {
            warn!("Failed to notify server of disconnect: {}", e);
        }
        self.status = ConnectionStatus::Disconnected;
        self.index = None;
    }
}

/// Session state shared between the reactor thread and the game loop
pub struct ClientState {
    server: SocketAddr,
    timeout: Duration,
    session: Mutex<Session>,
    messages: MessageQueue,
}

impl ClientState {
    pub fn new(server: SocketAddr, timeout: Duration, outbound: OutboundQueue) -> Self {
        Self {
            server,
            timeout,
            session: Mutex::new(Session {
                status: ConnectionStatus::Disconnected,
                index: None,
                sender: Sender::new(outbound),
                last_message: Instant::now(),
            }),
            messages: MessageQueue::new(),
        }
    }

    /// Rolls a client salt and asks the server for a slot
    fn connect(&self) -> Result<(), SendError> {
        let client_salt = roll_salt();
        debug!("Rolled client salt {:#018x}", client_salt);

        let mut session = lock(&self.session);
        session.sender.bind(self.server, Salts::new(client_salt, 0));
        session.status = ConnectionStatus::Connecting;
        session.index = None;
        session.last_message = Instant::now();
        session.sender.write_connection_requested()
    }

    fn maybe_timeout_at(&self, now: Instant) -> bool {
        let mut session = lock(&self.session);
        if session.status == ConnectionStatus::Disconnected {
            return false;
        }

        if now.saturating_duration_since(session.last_message) > self.timeout {
            info!("Server timed out");
            session.disconnect();
            return true;
        }

        false
    }

    /// Locks the session if `message` came from the server under the
    /// current salts
    fn session_for(
        &self,
        message: &Message,
        remote: SocketAddr,
    ) -> Option<std::sync::MutexGuard<'_, Session>> {
        if remote != self.server {
            debug!("Ignoring {:?} from {}", message.message_type(), remote);
            return None;
        }

        let session = lock(&self.session);
        if !session.sender.matches_xor_salt(message.header.salt) {
            debug!("Ignoring {:?} with foreign salt", message.message_type());
            return None;
        }
        Some(session)
    }
}

impl MessageHandler for ClientState {
    fn on_challenge(&self, message: &Message, remote: SocketAddr) {
        if remote != self.server {
            return;
        }

        let mut body = message.body.as_slice();
        let Ok(server_salt) = deserialize_u64(&mut body) else {
            warn!("Challenge without a server salt");
            return;
        };

        let mut session = lock(&self.session);
        let client_salt = session.sender.salts().client;
        if session.status != ConnectionStatus::Connecting
            || message.header.salt != client_salt ^ server_salt
        {
            debug!("Ignoring unexpected challenge");
            return;
        }

        session.sender.update_salts(Salts::new(client_salt, server_salt));
        session.last_message = Instant::now();
        if let Err(e) = session.sender.write_challenge_response() {
            error!("Failed to answer challenge: {}", e);
        }
    }

    fn on_connection_accepted(&self, message: &Message, remote: SocketAddr) {
        let Some(mut session) = self.session_for(message, remote) else {
            return;
        };

        let mut body = message.body.as_slice();
        let Ok(index) = deserialize_u8(&mut body) else {
            warn!("Acceptance without a client index");
            return;
        };

        session.last_message = Instant::now();
        if session.status == ConnectionStatus::Connecting {
            info!("Connected to {} as client {}", self.server, index);
            session.status = ConnectionStatus::Connected;
            session.index = Some(index);
            drop(session);
            self.messages.push(message.clone());
        }
    }

    fn on_connection_denied(&self, message: &Message, remote: SocketAddr) {
        let Some(mut session) = self.session_for(message, remote) else {
            return;
        };

        if session.status == ConnectionStatus::Connecting {
            warn!("Connection denied by {}", self.server);
            session.status = ConnectionStatus::Disconnected;
            drop(session);
            self.messages.push(message.clone());
        }
    }

    fn on_disconnected(&self, message: &Message, remote: SocketAddr) {
        let Some(mut session) = self.session_for(message, remote) else {
            return;
        };

        if session.status != ConnectionStatus::Disconnected {
            info!("Server closed the connection");
            session.status = ConnectionStatus::Disconnected;
            session.index = None;
            drop(session);
            self.messages.push(message.clone());
        }
    }

    fn on_ping(&self, message: &Message, remote: SocketAddr) {
        self.on_session_message(message, remote);
    }

    fn on_world_snapshot(&self, message: &Message, remote: SocketAddr) {
        self.on_session_message(message, remote);
    }
}

impl ClientState {
    fn on_session_message(&self, message: &Message, remote: SocketAddr) {
        let Some(mut session) = self.session_for(message, remote) else {
            return;
        };

        if session.status != ConnectionStatus::Connected
            || !session.sender.update_acks(message.header.sequence_id)
        {
            return;
        }

        session.last_message = Instant::now();
        drop(session);
        self.messages.push(message.clone());
    }
}

/// Game client end of the transport
///
/// Owns one UDP socket, a sender targeted at the server and the reactor
/// thread that receives on the same socket.
pub struct Client {
    state: Arc<ClientState>,
    outbound: Option<UnboundedReceiver<Datagram>>,
    endpoint: Option<Endpoint>,
    reactor: Option<Reactor>,
    local_addr: SocketAddr,
}

impl Client {
    pub fn new(config: &NetConfig) -> io::Result<Self> {
        let endpoint = Endpoint::bind(config.client_bind_addr())?;
        let local_addr = endpoint.local_addr()?;
        let (queue, outbound) = OutboundQueue::new();

        Ok(Self {
            state: Arc::new(ClientState::new(
                config.server_endpoint(),
                config.timeout,
                queue,
            )),
            outbound: Some(outbound),
            endpoint: Some(endpoint),
            reactor: None,
            local_addr,
        })
    }

    /// Starts the reactor and sends the connection request
    pub fn begin(&mut self) -> io::Result<()> {
        let (Some(endpoint), Some(outbound)) = (self.endpoint.take(), self.outbound.take()) else {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "client has already been started",
            ));
        };

        let handler: Arc<dyn MessageHandler> = self.state.clone();
        let listener = Listener::new(Arc::downgrade(&handler));
        self.reactor = Some(Reactor::start(endpoint, listener, outbound, "client-reactor")?);

        info!("Connecting to {} from {}", self.state.server, self.local_addr);
        self.state
            .connect()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    /// Says goodbye if still connected, then stops the reactor
    pub fn shutdown(&mut self) {
        let Some(mut reactor) = self.reactor.take() else {
            return;
        };

        lock(&self.state.session).disconnect();
        reactor.shutdown();
        info!("Client stopped");
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.state.server
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        lock(&self.state.session).status
    }

    pub fn is_connected(&self) -> bool {
        self.connection_status() == ConnectionStatus::Connected
    }

    /// Slot index assigned by the server, once connected
    pub fn client_index(&self) -> Option<u8> {
        lock(&self.state.session).index
    }

    pub fn next_message(&self) -> Option<Message> {
        self.state.messages.pop()
    }

    pub fn send_inputs(&self, inputs: &InputState) -> Result<(), SendError> {
        let mut session = lock(&self.state.session);
        if session.status != ConnectionStatus::Connected {
            return Err(SendError::NotConnected);
        }
        session.sender.write_user_inputs(inputs)
    }

    /// Drops the session if the server went silent for longer than the timeout
    pub fn maybe_timeout(&self) -> bool {
        self.state.maybe_timeout_at(Instant::now())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{decode_packet, dispatch, MessageBuilder, MessageType, CONNECTION_PADDING};

    const SERVER_SALT: u64 = 0xFEED_0000_0000_BEEF;

    fn server_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_state() -> (ClientState, UnboundedReceiver<Datagram>) {
        let (queue, rx) = OutboundQueue::new();
        (
            ClientState::new(server_addr(), Duration::from_secs(5), queue),
            rx,
        )
    }

    fn sent(rx: &mut UnboundedReceiver<Datagram>) -> Vec<Message> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .map(|d| decode_packet(&d.bytes).unwrap())
            .collect()
    }

    fn packet(message_type: MessageType, salt: u64, sequence_id: u32, body: &[u8]) -> Vec<u8> {
        MessageBuilder::new(message_type)
            .with_salt(salt)
            .with_ids(sequence_id, sequence_id)
            .with_acks(0, 0)
            .with_body(body)
            .build()
            .unwrap()
            .to_packet()
    }

    fn client_salt(state: &ClientState) -> u64 {
        lock(&state.session).sender.salts().client
    }

    fn status(state: &ClientState) -> ConnectionStatus {
        lock(&state.session).status
    }

    /// Drives the handshake from the server's side and returns the xor salt
    fn connected_state() -> (ClientState, UnboundedReceiver<Datagram>, u64) {
        let (state, mut rx) = test_state();
        state.connect().unwrap();
        let salt = client_salt(&state) ^ SERVER_SALT;

        dispatch(
            &state,
            &packet(MessageType::Challenge, salt, 0, &SERVER_SALT.to_be_bytes()),
            server_addr(),
        )
        .unwrap();
        dispatch(
            &state,
            &packet(MessageType::ConnectionAccepted, salt, 1, &[4]),
            server_addr(),
        )
        .unwrap();
        let _ = sent(&mut rx);
        let _ = state.messages.pop();
        (state, rx, salt)
    }

    /// Connecting sends one padded request under the client salt
    #[test]
    fn test_connect_sends_padded_request() {
        let (state, mut rx) = test_state();
        state.connect().unwrap();

        let out = sent(&mut rx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message_type(), MessageType::ConnectionRequested);
        assert_eq!(out[0].body.len(), CONNECTION_PADDING);
        assert_eq!(out[0].header.salt, client_salt(&state));
        assert_eq!(status(&state), ConnectionStatus::Connecting);
    }

    /// The challenge is answered with the server salt echoed and padded
    #[test]
    fn test_challenge_is_answered_with_echo() {
        let (state, mut rx) = test_state();
        state.connect().unwrap();
        let _ = sent(&mut rx);
        let salt = client_salt(&state) ^ SERVER_SALT;

        dispatch(
            &state,
            &packet(MessageType::Challenge, salt, 0, &SERVER_SALT.to_be_bytes()),
            server_addr(),
        )
        .unwrap();

        let out = sent(&mut rx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message_type(), MessageType::ChallengeResponse);
        assert_eq!(out[0].header.salt, salt);
        assert_eq!(out[0].body.len(), CONNECTION_PADDING);
        assert_eq!(&out[0].body[..8], &SERVER_SALT.to_be_bytes());
    }

    #[test]
    fn test_challenge_with_wrong_salt_ignored() {
        let (state, mut rx) = test_state();
        state.connect().unwrap();
        let _ = sent(&mut rx);

        dispatch(
            &state,
            &packet(MessageType::Challenge, 0x1111, 0, &SERVER_SALT.to_be_bytes()),
            server_addr(),
        )
        .unwrap();

        assert!(sent(&mut rx).is_empty());
    }

    #[test]
    fn test_acceptance_connects() {
        let (state, _rx, _salt) = connected_state();

        assert_eq!(status(&state), ConnectionStatus::Connected);
        assert_eq!(lock(&state.session).index, Some(4));
    }

    #[test]
    fn test_denial_disconnects_and_is_queued() {
        let (state, _rx) = test_state();
        state.connect().unwrap();
        let salt = client_salt(&state);

        dispatch(
            &state,
            &packet(MessageType::ConnectionDenied, salt, 0, &[]),
            server_addr(),
        )
        .unwrap();

        assert_eq!(status(&state), ConnectionStatus::Disconnected);
        assert_eq!(
            state.messages.pop().unwrap().message_type(),
            MessageType::ConnectionDenied
        );
    }

    #[test]
    fn test_foreign_endpoint_ignored() {
        let (state, _rx, salt) = connected_state();
        let stranger: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        dispatch(
            &state,
            &packet(MessageType::Disconnected, salt, 2, &[]),
            stranger,
        )
        .unwrap();

        assert_eq!(status(&state), ConnectionStatus::Connected);
        assert!(state.messages.is_empty());
    }

    /// Stale and duplicate snapshots never reach the queue
    #[test]
    fn test_snapshots_queued_in_order_without_duplicates() {
        let (state, _rx, salt) = connected_state();

        for sequence_id in [2, 3, 3, 1, 5] {
            dispatch(
                &state,
                &packet(MessageType::WorldSnapshot, salt, sequence_id, &[sequence_id as u8]),
                server_addr(),
            )
            .unwrap();
        }

        let bodies: Vec<Vec<u8>> = std::iter::from_fn(|| state.messages.pop())
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, vec![vec![2], vec![3], vec![5]]);
    }

    #[test]
    fn test_server_disconnect() {
        let (state, _rx, salt) = connected_state();

        dispatch(&state, &packet(MessageType::Disconnected, salt, 2, &[]), server_addr()).unwrap();

        assert_eq!(status(&state), ConnectionStatus::Disconnected);
        assert_eq!(
            state.messages.pop().unwrap().message_type(),
            MessageType::Disconnected
        );
    }

    /// A timed out session notifies the server exactly once
    #[test]
    fn test_timeout_sends_one_disconnect() {
        let (state, mut rx, _salt) = connected_state();
        let start = Instant::now();

        assert!(!state.maybe_timeout_at(start + Duration::from_secs(4)));
        assert!(state.maybe_timeout_at(start + Duration::from_secs(6)));
        assert!(!state.maybe_timeout_at(start + Duration::from_secs(60)));

        let out = sent(&mut rx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message_type(), MessageType::Disconnected);
    }

    /// Timing out before the challenge arrives sends nothing
    #[test]
    fn test_timeout_before_challenge_sends_no_notice() {
        let (state, mut rx) = test_state();
        state.connect().unwrap();
        let _ = sent(&mut rx);

        assert!(state.maybe_timeout_at(Instant::now() + Duration::from_secs(6)));
        assert_eq!(status(&state), ConnectionStatus::Disconnected);
        assert!(sent(&mut rx).is_empty());
    }

    #[test]
    fn test_client_over_loopback_without_server() {
        let config = NetConfig::default().with_server_port(1);
        let mut client = Client::new(&config).unwrap();

        assert_eq!(client.connection_status(), ConnectionStatus::Disconnected);
        assert!(matches!(
            client.send_inputs(&InputState::default()),
            Err(SendError::NotConnected)
        ));

        client.begin().unwrap();
        assert_eq!(client.connection_status(), ConnectionStatus::Connecting);
        assert!(client.client_index().is_none());
        assert!(client.begin().is_err());

        client.shutdown();
        assert_eq!(client.connection_status(), ConnectionStatus::Disconnected);
    }
}
