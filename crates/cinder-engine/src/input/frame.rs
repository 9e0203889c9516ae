use std::collections::HashSet;

use super::state::InputState;
use super::types::{InputEvent, Key, MouseButton};

/// Per-frame input deltas.
///
/// `InputState` holds what is currently down; `InputFrame` holds what changed
/// since the previous iteration.
#[derive(Debug, Clone, Default)]
pub struct InputFrame {
    /// Raw events in arrival order.
    pub events: Vec<InputEvent>,

    pub keys_pressed: HashSet<Key>,
    pub keys_released: HashSet<Key>,

    pub buttons_pressed: HashSet<MouseButton>,
    pub buttons_released: HashSet<MouseButton>,

    /// Text committed this frame, concatenated.
    pub text: String,

    /// Accumulated raw mouse motion this frame.
    pub mouse_delta: (f32, f32),
}

impl InputFrame {
    pub fn clear(&mut self) {
        self.events.clear();
        self.keys_pressed.clear();
        self.keys_released.clear();
        self.buttons_pressed.clear();
        self.buttons_released.clear();
        self.text.clear();
        self.mouse_delta = (0.0, 0.0);
    }

    pub fn key_pressed(&self, key: Key) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn key_released(&self, key: Key) -> bool {
        self.keys_released.contains(&key)
    }
}

/// Immutable copy of the input picture handed to the update callback.
#[derive(Debug, Clone, Default)]
pub struct InputSnapshot {
    pub state: InputState,
    pub frame: InputFrame,
}

impl InputSnapshot {
    #[inline]
    pub fn key_down(&self, key: Key) -> bool {
        self.state.key_down(key)
    }

    #[inline]
    pub fn key_pressed(&self, key: Key) -> bool {
        self.frame.key_pressed(key)
    }

    #[inline]
    pub fn mouse_delta(&self) -> (f32, f32) {
        self.frame.mouse_delta
    }
}
