//! Integration tests for the client/server transport
//!
//! Every test runs a real `Server` and real `Client`s on loopback sockets
//! with ephemeral ports, so tests can run in parallel.

use client::network::Client;
use server::game::Game;
use server::network::Server;
use shared::{ConnectionStatus, InputState, MessageType, NetConfig, WorldState};
use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(3);

/// Polls `condition` until it holds or `WAIT` elapses
fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn start_server(max_clients: u8, timeout: Duration) -> Server {
    let config = NetConfig::default()
        .with_server_port(0)
        .with_max_clients(max_clients)
        .with_timeout(timeout);
    let mut server = Server::new(&config).expect("bind server");
    server.begin().expect("start server");
    server
}

fn client_config(server: &Server) -> NetConfig {
    NetConfig::default().with_server_port(server.local_addr().port())
}

fn connect_client(server: &Server) -> Client {
    let mut client = Client::new(&client_config(server)).expect("bind client");
    client.begin().expect("start client");
    assert!(wait_until(|| client.is_connected()), "handshake did not complete");
    client
}

/// HANDSHAKE TESTS
mod handshake_tests {
    use super::*;

    /// Tests the full salted handshake lands the first client in slot 0
    #[test]
    fn full_handshake_over_udp() {
        let server = start_server(8, Duration::from_secs(5));
        let client = connect_client(&server);

        assert_eq!(client.client_index(), Some(0));
        assert_eq!(server.connection_status(0), Some(ConnectionStatus::Connected));
        assert_eq!(server.connected_count(), 1);
        assert!(wait_until(|| server.next_new_client() == Some(0)));

        let accepted = client.next_message().expect("acceptance queued");
        assert_eq!(accepted.message_type(), MessageType::ConnectionAccepted);
        assert_eq!(accepted.body, vec![0]);
    }

    /// Tests that concurrent clients are bound to separate slots
    #[test]
    fn clients_get_distinct_slots() {
        let server = start_server(4, Duration::from_secs(5));
        let first = connect_client(&server);
        let second = connect_client(&server);

        assert_eq!(first.client_index(), Some(0));
        assert_eq!(second.client_index(), Some(1));
        assert_eq!(server.connected_count(), 2);
    }

    /// Tests that a request finding no free slot is answered with a denial
    #[test]
    fn full_server_denies_connection() {
        let server = start_server(1, Duration::from_secs(5));
        let _admitted = connect_client(&server);

        let mut rejected = Client::new(&client_config(&server)).unwrap();
        rejected.begin().unwrap();

        assert!(wait_until(|| rejected.next_message().is_some_and(|m| {
            m.message_type() == MessageType::ConnectionDenied
        })));
        assert_eq!(rejected.connection_status(), ConnectionStatus::Disconnected);
        assert_eq!(server.connected_count(), 1);
    }

    /// Tests that garbage datagrams neither crash the server nor occupy slots
    #[test]
    fn malformed_packets_are_ignored() {
        let server = start_server(2, Duration::from_secs(5));
        let attacker = UdpSocket::bind("127.0.0.1:0").unwrap();

        attacker.send_to(&[], server.local_addr()).unwrap();
        attacker.send_to(&[0xAB; 7], server.local_addr()).unwrap();
        attacker.send_to(&[0x00; 600], server.local_addr()).unwrap();
        attacker.send_to(&[0xFF; 1500], server.local_addr()).unwrap();

        let client = connect_client(&server);
        assert_eq!(client.client_index(), Some(0));
        assert_eq!(server.connected_count(), 1);
    }
}

/// SESSION TESTS
mod session_tests {
    use super::*;

    /// Tests that client inputs are queued on the owning slot
    #[test]
    fn inputs_reach_server_slot() {
        let server = start_server(2, Duration::from_secs(5));
        let client = connect_client(&server);

        let input = InputState {
            jump: true,
            left: false,
            right: true,
        };
        client.send_inputs(&input).unwrap();

        let mut received = None;
        assert!(wait_until(|| {
            received = server.next_message(0);
            received.is_some()
        }));

        let message = received.unwrap();
        assert_eq!(message.message_type(), MessageType::UserInputs);
        assert_eq!(InputState::from_bytes(&message.body).unwrap(), input);
    }

    /// Tests that a broadcast snapshot decodes to the same world on the client
    #[test]
    fn world_snapshot_reaches_client() {
        let server = start_server(2, Duration::from_secs(5));
        let client = connect_client(&server);
        let _ = client.next_message();

        let mut world = WorldState::new();
        world.add_player(0);
        world.transform_player(0, 25.0, -10.0);
        server.send_world_state(&world).unwrap();

        let mut snapshot = None;
        assert!(wait_until(|| {
            snapshot = client.next_message();
            snapshot.is_some()
        }));

        let message = snapshot.unwrap();
        assert_eq!(message.message_type(), MessageType::WorldSnapshot);
        assert_eq!(WorldState::from_bytes(&message.body).unwrap(), world);
    }

    /// Tests that one game tick admits the new player and broadcasts it
    #[test]
    fn game_tick_admits_and_broadcasts() {
        let server = start_server(2, Duration::from_secs(5));
        let client = connect_client(&server);
        let _ = client.next_message();

        let mut game = Game::new(1);
        let report = game.tick(&server, 1.0 / 30.0);
        assert_eq!(report.joined, vec![0]);
        assert_eq!(game.world().player_count(), 1);

        let mut players = 0;
        assert!(wait_until(|| {
            while let Some(message) = client.next_message() {
                if message.message_type() == MessageType::WorldSnapshot {
                    players = WorldState::from_bytes(&message.body).unwrap().player_count();
                }
            }
            players == 1
        }));
    }

    /// A slot freed and re-bound between ticks keeps a player for the new client
    #[test]
    fn rejoin_into_same_slot_between_ticks() {
        let server = start_server(1, Duration::from_secs(5));
        let mut game = Game::new(30);

        let mut first = connect_client(&server);
        assert_eq!(game.tick(&server, 1.0 / 30.0).joined, vec![0]);

        first.shutdown();
        assert!(wait_until(
            || server.connection_status(0) == Some(ConnectionStatus::Disconnected)
        ));

        let second = connect_client(&server);
        assert_eq!(second.client_index(), Some(0));
        let input = InputState {
            jump: false,
            left: false,
            right: true,
        };
        for _ in 0..5 {
            second.send_inputs(&input).unwrap();
        }

        let report = game.tick(&server, 1.0 / 30.0);
        assert_eq!(report.left, vec![0]);
        assert_eq!(report.joined, vec![0]);
        assert_eq!(game.world().player_count(), 1);

        let mut applied = report.inputs_applied;
        assert!(wait_until(|| {
            applied += game.tick(&server, 1.0 / 30.0).inputs_applied;
            applied == 5
        }));
        assert!(server.next_message(0).is_none());
    }

    /// A session dropped by the tick's timeout sweep frees its slot for a new client
    #[test]
    fn timed_out_slot_can_be_rejoined() {
        let server = start_server(1, Duration::from_millis(200));
        let mut game = Game::new(30);

        let silent = connect_client(&server);
        assert_eq!(game.tick(&server, 1.0 / 30.0).joined, vec![0]);

        thread::sleep(Duration::from_millis(400));
        let report = game.tick(&server, 1.0 / 30.0);
        assert_eq!(report.left, vec![0]);
        assert_eq!(game.world().player_count(), 0);
        assert!(wait_until(
            || silent.connection_status() == ConnectionStatus::Disconnected
        ));

        let replacement = connect_client(&server);
        assert_eq!(replacement.client_index(), Some(0));

        let report = game.tick(&server, 1.0 / 30.0);
        assert_eq!(report.joined, vec![0]);
        assert_eq!(game.world().player_count(), 1);
        assert_eq!(server.connected_count(), 1);
    }

    /// Tests that a client goodbye releases its slot for the next client
    #[test]
    fn client_disconnect_frees_slot() {
        let server = start_server(1, Duration::from_secs(5));
        let mut client = connect_client(&server);

        client.shutdown();

        assert!(wait_until(|| server.next_disconnected_client() == Some(0)));
        assert_eq!(server.connection_status(0), Some(ConnectionStatus::Disconnected));

        let replacement = connect_client(&server);
        assert_eq!(replacement.client_index(), Some(0));
    }

    /// Tests that server shutdown disconnects every connected client
    #[test]
    fn server_shutdown_notifies_clients() {
        let mut server = start_server(2, Duration::from_secs(5));
        let client = connect_client(&server);

        server.shutdown();

        assert!(wait_until(
            || client.connection_status() == ConnectionStatus::Disconnected
        ));
    }

    /// Tests that a silent session is dropped and the client is told
    #[test]
    fn silent_client_times_out() {
        let server = start_server(2, Duration::from_millis(200));
        let client = connect_client(&server);

        thread::sleep(Duration::from_millis(400));
        assert_eq!(server.maybe_timeout_all(), vec![0]);
        assert_eq!(server.next_disconnected_client(), Some(0));

        assert!(wait_until(
            || client.connection_status() == ConnectionStatus::Disconnected
        ));
    }
}

/// ASYNC RECEIVE TESTS
mod async_tests {
    use super::*;

    /// Tests the challenge a hand-built request receives over async UDP
    #[tokio::test]
    async fn raw_request_is_challenged() {
        let server = start_server(2, Duration::from_secs(5));
        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let request = shared::MessageBuilder::new(MessageType::ConnectionRequested)
            .with_salt(0xC0FFEE)
            .with_ids(0, 0)
            .with_acks(0, 0)
            .with_padding(shared::CONNECTION_PADDING)
            .build()
            .unwrap();
        socket
            .send_to(&request.to_packet(), server.local_addr())
            .await
            .unwrap();

        let mut buf = [0u8; 2048];
        let (len, from) = tokio::time::timeout(WAIT, socket.recv_from(&mut buf))
            .await
            .expect("challenge within timeout")
            .unwrap();
        let challenge = shared::decode_packet(&buf[..len]).unwrap();

        assert_eq!(from, server.local_addr());
        assert_eq!(challenge.message_type(), MessageType::Challenge);
        assert_eq!(challenge.body.len(), 8);
        let server_salt = u64::from_be_bytes(challenge.body[..8].try_into().unwrap());
        assert_eq!(challenge.header.salt, 0xC0FFEE ^ server_salt);
        assert_eq!(server.connection_status(0), Some(ConnectionStatus::Connecting));
    }
}
