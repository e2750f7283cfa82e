//! Headless input source with change detection and keep-alive pacing

use rand::Rng;
use shared::InputState;
use std::time::{Duration, Instant};

/// Produces the inputs a player would send, without a window or keyboard.
///
/// Movement alternates left and right every `stride` ticks, and each tick
/// has a small chance of a jump. An input is reported when it differs from
/// the previous one, or when `keep_alive` has passed since the last send so
/// the server never sees the session go silent.
pub struct InputManager {
    tick: u64,
    stride: u64,
    jump_chance: f64,
    keep_alive: Duration,
    current_input: InputState,
    last_input_sent: Option<Instant>,
}

impl InputManager {
    pub fn new(stride: u64, jump_chance: f64, keep_alive: Duration) -> Self {
        Self {
            tick: 0,
            stride: stride.max(1),
            jump_chance: jump_chance.clamp(0.0, 1.0),
            keep_alive,
            current_input: InputState::default(),
            last_input_sent: None,
        }
    }

    /// Advances one tick and returns the input to send, if any
    pub fn update<R: Rng>(&mut self, rng: &mut R, now: Instant) -> Option<InputState> {
        let moving_right = (self.tick / self.stride) % 2 == 0;
        self.tick += 1;

        let input = InputState {
            jump: rng.gen_bool(self.jump_chance),
            left: !moving_right,
            right: moving_right,
        };

        let changed = input != self.current_input;
        let due = self
            .last_input_sent
            .map_or(true, |sent| now.saturating_duration_since(sent) >= self.keep_alive);

        self.current_input = input;
        if changed || due {
            self.last_input_sent = Some(now);
            Some(input)
        } else {
            None
        }
    }

    pub fn current_input(&self) -> &InputState {
        &self.current_input
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new(30, 0.05, Duration::from_millis(250))
    }
}
