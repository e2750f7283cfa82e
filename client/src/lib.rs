//! # Game Client Library
//!
//! The client end of the reliable-UDP transport, plus a headless input
//! source for driving it without a window.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Manages the session with the server:
//! - Salted handshake (`ConnectionRequested`, `Challenge`,
//!   `ChallengeResponse`, `ConnectionAccepted`/`ConnectionDenied`)
//! - Filtering of messages from foreign endpoints or sessions
//! - Stale and duplicate snapshot suppression
//! - Server timeout detection and graceful disconnect
//!
//! ### Input Module (`input`)
//! Produces `InputState`s to send each tick, suppressing repeats until a
//! keep-alive interval has passed.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use shared::{InputState, MessageType, NetConfig, WorldState};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new(&NetConfig::default())?;
//!     client.begin()?;
//!
//!     loop {
//!         while let Some(message) = client.next_message() {
//!             if message.message_type() == MessageType::WorldSnapshot {
//!                 let world = WorldState::from_bytes(&message.body)?;
//!                 println!("{} players", world.player_count());
//!             }
//!         }
//!
//!         if client.is_connected() {
//!             client.send_inputs(&InputState { jump: false, left: false, right: true })?;
//!         }
//!         if client.maybe_timeout() {
//!             break;
//!         }
//!         std::thread::sleep(std::time::Duration::from_millis(16));
//!     }
//!
//!     client.shutdown();
//!     Ok(())
//! }
//! ```

pub mod input;
pub mod network;
