//! Game payloads carried inside `UserInputs` and `WorldSnapshot` messages

use crate::error::WireError;
use crate::serialize::deserialize_u8;
use serde::{Deserialize, Serialize};

pub const PLAYER_SPEED: f32 = 300.0;
pub const JUMP_HEIGHT: f32 = 64.0;
pub const WORLD_WIDTH: f32 = 800.0;
pub const FLOOR_Y: f32 = 550.0;

const JUMP_BIT: u8 = 1 << 0;
const LEFT_BIT: u8 = 1 << 1;
const RIGHT_BIT: u8 = 1 << 2;

/// Buttons held by a player during one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub jump: bool,
    pub left: bool,
    pub right: bool,
}

impl InputState {
    pub const SIZE: usize = 1;

    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.jump {
            bits |= JUMP_BIT;
        }
        if self.left {
            bits |= LEFT_BIT;
        }
        if self.right {
            bits |= RIGHT_BIT;
        }
        bits
    }

    /// Unknown bits are ignored
    pub fn from_bits(bits: u8) -> Self {
        Self {
            jump: bits & JUMP_BIT != 0,
            left: bits & LEFT_BIT != 0,
            right: bits & RIGHT_BIT != 0,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        vec![self.bits()]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let mut cursor = bytes;
        deserialize_u8(&mut cursor).map(Self::from_bits)
    }

    /// Horizontal direction, -1.0 / 0.0 / 1.0
    pub fn horizontal(&self) -> f32 {
        match (self.left, self.right) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerPosition {
    pub index: u8,
    pub x: f32,
    pub y: f32,
}

/// Authoritative positions of every admitted player
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    players: Vec<PlayerPosition>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a player at the spawn point. Re-adding an index resets its position.
    pub fn add_player(&mut self, index: u8) {
        self.remove_player(index);
        let spawn_x = 100.0 + f32::from(index) * 50.0;
        self.players.push(PlayerPosition {
            index,
            x: spawn_x.min(WORLD_WIDTH),
            y: FLOOR_Y,
        });
    }

    pub fn remove_player(&mut self, index: u8) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.index != index);
        self.players.len() != before
    }

    /// Moves a player by `(dx, dy)`, keeping it inside the world bounds.
    /// Returns false if the index has no player.
    pub fn transform_player(&mut self, index: u8, dx: f32, dy: f32) -> bool {
        match self.players.iter_mut().find(|p| p.index == index) {
            Some(player) => {
                player.x = (player.x + dx).clamp(0.0, WORLD_WIDTH);
                player.y = (player.y + dy).clamp(0.0, FLOOR_Y);
                true
            }
            None => false,
        }
    }

    /// Applies one tick of input: horizontal movement at `PLAYER_SPEED`, a
    /// jump lifts the player by `JUMP_HEIGHT` and releasing it lands again
    pub fn apply_input(&mut self, index: u8, input: &InputState, dt: f32) -> bool {
        let dx = input.horizontal() * PLAYER_SPEED * dt;
        let Some(current) = self.player_position(index) else {
            return false;
        };

        let target_y = if input.jump {
            FLOOR_Y - JUMP_HEIGHT
        } else {
            FLOOR_Y
        };
        self.transform_player(index, dx, target_y - current.y)
    }

    pub fn player_position(&self, index: u8) -> Option<PlayerPosition> {
        self.players.iter().find(|p| p.index == index).copied()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn players(&self) -> &[PlayerPosition] {
        &self.players
    }

    pub fn to_bytes(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> bincode::Result<Self> {
        bincode::deserialize(bytes)
    }
}
