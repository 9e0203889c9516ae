//! Surface manager.
//!
//! Owns the native window for a context and turns its events into a drained,
//! arrival-ordered `InputEvent` stream. The window is released exactly once,
//! by `close` or on drop, whichever comes first.

use crate::config::SurfaceConfig;
use crate::context::Context;
use crate::error::Result;
use crate::input::InputEvent;
use crate::platform::WindowSystem;

pub struct Surface<W: WindowSystem> {
    context: Context,
    config: SurfaceConfig,
    window: W,
    size: (u32, u32),
    closed: bool,
}

impl<W: WindowSystem> Surface<W> {
    /// Opens the context's surface, creating the window with `open_window`.
    ///
    /// Fails with `Error::SurfaceAlreadyOpen` if the context already has one and
    /// with `Error::Platform` if the window cannot be created.
    pub fn open<F>(context: &Context, config: SurfaceConfig, open_window: F) -> Result<Self>
    where
        F: FnOnce(&SurfaceConfig) -> Result<W>,
    {
        context.ensure_alive()?;
        context.claim_surface()?;

        let window = match open_window(&config) {
            Ok(window) => window,
            Err(e) => {
                context.release_surface();
                log::error!("failed to open surface {:?}: {e}", config.title);
                return Err(e);
            }
        };

        let size = window.framebuffer_size();
        log::debug!("surface {:?} opened at {}x{}", config.title, size.0, size.1);

        Ok(Self {
            context: context.clone(),
            config,
            window,
            size,
            closed: false,
        })
    }

    /// Pumps the native event loop once and drains what arrived.
    ///
    /// Never blocks. The returned iterator yields events lazily in arrival
    /// order. Dropping it drains whatever was not consumed: those events are
    /// discarded, but resizes among them still update `current_size`.
    pub fn poll_events(&mut self) -> Result<Events<'_, W>> {
        if !self.closed {
            self.window.pump_events()?;
        }
        Ok(Events { surface: self })
    }

    /// Size in physical pixels as of the latest drained resize event.
    pub fn current_size(&self) -> (u32, u32) {
        self.size
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Shows the completed frame. Blocks at most one refresh interval with vsync.
    pub fn present(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.window.swap_buffers()
    }

    pub fn set_cursor_captured(&mut self, captured: bool) {
        if !self.closed {
            self.window.set_cursor_captured(captured);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    /// Releases the native window. Later calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.window.set_cursor_captured(false);
        self.window.release();
        self.context.release_surface();
        log::debug!("surface {:?} closed", self.config.title);
    }

    fn next_event(&mut self) -> Option<InputEvent> {
        if self.closed {
            return None;
        }
        let event = self.window.poll_event()?;
        if let InputEvent::Resized { width, height } = event {
            self.size = (width, height);
        }
        Some(event)
    }
}

impl<W: WindowSystem> Drop for Surface<W> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Events drained by one `Surface::poll_events` call.
pub struct Events<'a, W: WindowSystem> {
    surface: &'a mut Surface<W>,
}

impl<W: WindowSystem> Iterator for Events<'_, W> {
    type Item = InputEvent;

    fn next(&mut self) -> Option<InputEvent> {
        self.surface.next_event()
    }
}

impl<W: WindowSystem> Drop for Events<'_, W> {
    fn drop(&mut self) {
        let discarded = self.by_ref().count();
        if discarded > 0 {
            log::trace!("discarded {discarded} unread event(s)");
        }
    }
}
