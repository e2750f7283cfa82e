use crate::message::Message;
use std::net::SocketAddr;

/// Receives decoded messages from a [`Listener`](crate::listener::Listener).
///
/// Every method defaults to doing nothing, so a client only overrides the
/// server-to-client callbacks and a server the client-to-server ones.
/// Callbacks run on the reactor thread.
pub trait MessageHandler: Send + Sync {
    fn on_disconnected(&self, _message: &Message, _remote: SocketAddr) {}

    fn on_ping(&self, _message: &Message, _remote: SocketAddr) {}

    fn on_connection_requested(&self, _message: &Message, _remote: SocketAddr) {}

    fn on_challenge_response(&self, _message: &Message, _remote: SocketAddr) {}

    fn on_user_inputs(&self, _message: &Message, _remote: SocketAddr) {}

    fn on_connection_accepted(&self, _message: &Message, _remote: SocketAddr) {}

    fn on_connection_denied(&self, _message: &Message, _remote: SocketAddr) {}

    fn on_challenge(&self, _message: &Message, _remote: SocketAddr) {}

    fn on_world_snapshot(&self, _message: &Message, _remote: SocketAddr) {}
}
