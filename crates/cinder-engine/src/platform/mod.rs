//! Windowing/input seam.
//!
//! The surface manager talks to the native window through `WindowSystem`; it
//! never sees winit types.

pub mod headless;
pub mod winit;

use crate::error::Result;
use crate::input::InputEvent;

/// Native window plus its event source.
pub trait WindowSystem {
    /// Processes pending native events without blocking.
    ///
    /// Fails with `Error::Platform` if the display connection is gone.
    fn pump_events(&mut self) -> Result<()>;

    /// Next translated event collected by `pump_events`, in arrival order.
    fn poll_event(&mut self) -> Option<InputEvent>;

    /// Drawable size in physical pixels.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Shows the most recently submitted frame.
    fn swap_buffers(&mut self) -> Result<()>;

    /// Hides and locks the cursor for mouse-look.
    fn set_cursor_captured(&mut self, captured: bool) {
        let _ = captured;
    }

    /// Destroys the native window. Called exactly once by the surface.
    fn release(&mut self);
}
