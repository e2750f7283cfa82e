//! # Game Server Library
//!
//! The authoritative end of the reliable-UDP transport. A [`network::Server`]
//! owns one socket and a fixed pool of [`client_slot::ClientSlot`]s; the
//! reactor thread routes handshake and gameplay messages into the slots,
//! and the game loop drains them between ticks.
//!
//! ## Module Organization
//!
//! ### Client Slot Module (`client_slot`)
//! Per-connection session state:
//! - Handshake progress (`Disconnected`, `Connecting`, `Connected`)
//! - Session salts and reliability counters through the slot's sender
//! - Inbound message queue with stale/duplicate filtering
//! - Timeout detection
//!
//! ### Network Module (`network`)
//! Slot allocation and message routing:
//! - Connection requests bind the first free slot and send a challenge
//! - Correct challenge responses accept the client
//! - A full pool answers with `ConnectionDenied`
//! - Inputs and pings are routed by endpoint and salt
//!
//! ### Game Module (`game`)
//! The tick run by the server binary: admit and remove players, apply
//! queued inputs, keep sessions alive and broadcast the world snapshot.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::game::Game;
//! use server::network::Server;
//! use shared::NetConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(&NetConfig::default())?;
//!     server.begin()?;
//!
//!     let mut game = Game::new(30);
//!     loop {
//!         game.tick(&server, 1.0 / 30.0);
//!         std::thread::sleep(std::time::Duration::from_millis(33));
//!     }
//! }
//! ```

pub mod client_slot;
pub mod game;
pub mod network;
