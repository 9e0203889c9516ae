//! Input subsystem.
//!
//! Public API is platform-agnostic and does not expose winit types.
//! Window backends translate native events into `InputEvent`s; the surface
//! manager hands them to the frame scheduler in arrival order.

mod frame;
mod state;
mod types;

pub use frame::{InputFrame, InputSnapshot};
pub use state::InputState;
pub use types::{
    InputEvent, Key, KeyState, Modifiers, MouseButton, MouseButtonState, MouseWheelDelta,
    PointerButtonEvent,
};
