//! Authoritative game loop driven by the server binary

use crate::network::Server;
use log::{debug, info, warn};
use shared::{ConnectionStatus, InputState, Message, MessageType, WorldState};

/// What happened during one tick
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub joined: Vec<u8>,
    pub left: Vec<u8>,
    pub inputs_applied: usize,
}

#[derive(Debug)]
pub struct Game {
    world: WorldState,
    tick: u64,
    ping_every: u64,
}

impl Game {
    /// `ping_every` is the number of ticks between keep-alive pings
    pub fn new(ping_every: u64) -> Self {
        Self {
            world: WorldState::new(),
            tick: 0,
            ping_every: ping_every.max(1),
        }
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Removes and admits players, applies queued inputs, then broadcasts
    /// the resulting snapshot
    pub fn tick(&mut self, server: &Server, dt: f32) -> TickReport {
        let mut report = TickReport::default();

        // A slot is released before it can be rebound, so leaves go first
        server.maybe_timeout_all();
        while let Some(index) = server.next_disconnected_client() {
            if self.world.remove_player(index) {
                info!("Player {} left", index);
                report.left.push(index);
            }
        }

        while let Some(index) = server.next_new_client() {
            if self.world.player_position(index).is_none() {
                info!("Player {} joined", index);
                self.world.add_player(index);
                report.joined.push(index);
            }
        }

        self.reconcile(server, &mut report);

        let indices: Vec<u8> = self.world.players().iter().map(|p| p.index).collect();
        for index in indices {
            while let Some(message) = server.next_message(index) {
                if self.apply_message(index, &message, dt) {
                    report.inputs_applied += 1;
                }
            }
        }

        self.tick += 1;
        if self.tick % self.ping_every == 0 {
            server.ping_all();
        }

        if let Err(e) = server.send_world_state(&self.world) {
            warn!("Failed to serialize world state: {}", e);
        }

        report
    }

    /// Matches the world to the slot pool when join and leave events for
    /// one slot raced within a single tick
    fn reconcile(&mut self, server: &Server, report: &mut TickReport) {
        for index in 0..server.max_clients() {
            let connected = server.connection_status(index) == Some(ConnectionStatus::Connected);
            let present = self.world.player_position(index).is_some();

            if connected && !present {
                debug!("Slot {} is connected without a player, admitting", index);
                self.world.add_player(index);
                report.joined.push(index);
            } else if !connected && present {
                debug!("Slot {} is no longer connected, removing player", index);
                self.world.remove_player(index);
                report.left.push(index);
            }
        }
    }

    fn apply_message(&mut self, index: u8, message: &Message, dt: f32) -> bool {
        match message.message_type() {
            MessageType::UserInputs => match InputState::from_bytes(&message.body) {
                Ok(input) => self.world.apply_input(index, &input, dt),
                Err(e) => {
                    warn!("Bad input payload from player {}: {}", index, e);
                    false
                }
            },
            MessageType::Ping => false,
            other => {
                debug!("Ignoring {:?} queued for player {}", other, index);
                false
            }
        }
    }
}
