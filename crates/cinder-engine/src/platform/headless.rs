//! Scripted window without a display.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::input::InputEvent;

use super::WindowSystem;

#[derive(Debug, Default)]
struct Shared {
    /// Events not yet picked up by a pump.
    native: VecDeque<InputEvent>,
    /// Size as seen by the window after the last pump.
    size: (u32, u32),
    presents: u64,
    releases: u32,
    cursor_captured: bool,
    disconnected: bool,
}

/// Window backend driven entirely by a `HeadlessController`.
#[derive(Debug)]
pub struct HeadlessWindow {
    shared: Arc<Mutex<Shared>>,
    ready: VecDeque<InputEvent>,
}

/// Drives a `HeadlessWindow` from tests or tools.
#[derive(Debug, Clone)]
pub struct HeadlessController {
    shared: Arc<Mutex<Shared>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

impl HeadlessWindow {
    pub fn new(width: u32, height: u32) -> Self {
        let shared = Shared {
            size: (width, height),
            ..Shared::default()
        };
        Self {
            shared: Arc::new(Mutex::new(shared)),
            ready: VecDeque::new(),
        }
    }

    pub fn controller(&self) -> HeadlessController {
        HeadlessController {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl HeadlessController {
    /// Queues a native event; it becomes visible at the next pump.
    pub fn push_event(&self, event: InputEvent) {
        lock(&self.shared).native.push_back(event);
    }

    /// Queues a resize to `width`x`height`.
    pub fn resize(&self, width: u32, height: u32) {
        self.push_event(InputEvent::Resized { width, height });
    }

    pub fn request_close(&self) {
        self.push_event(InputEvent::CloseRequested);
    }

    /// Makes the next pump fail as if the display server went away.
    pub fn disconnect(&self) {
        lock(&self.shared).disconnected = true;
    }

    pub fn presents(&self) -> u64 {
        lock(&self.shared).presents
    }

    pub fn releases(&self) -> u32 {
        lock(&self.shared).releases
    }

    pub fn cursor_captured(&self) -> bool {
        lock(&self.shared).cursor_captured
    }
}

impl WindowSystem for HeadlessWindow {
    fn pump_events(&mut self) -> Result<()> {
        let mut shared = lock(&self.shared);
        if shared.disconnected {
            return Err(Error::Platform("headless display disconnected".into()));
        }
        while let Some(event) = shared.native.pop_front() {
            if let InputEvent::Resized { width, height } = event {
                shared.size = (width, height);
            }
            self.ready.push_back(event);
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<InputEvent> {
        self.ready.pop_front()
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        lock(&self.shared).size
    }

    fn swap_buffers(&mut self) -> Result<()> {
        lock(&self.shared).presents += 1;
        Ok(())
    }

    fn set_cursor_captured(&mut self, captured: bool) {
        lock(&self.shared).cursor_captured = captured;
    }

    fn release(&mut self) {
        self.ready.clear();
        lock(&self.shared).releases += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_surface_only_after_pump() {
        let mut window = HeadlessWindow::new(800, 600);
        let control = window.controller();

        control.resize(1024, 768);
        assert!(window.poll_event().is_none());
        assert_eq!(window.framebuffer_size(), (800, 600));

        window.pump_events().unwrap();
        assert_eq!(window.framebuffer_size(), (1024, 768));
        assert_eq!(
            window.poll_event(),
            Some(InputEvent::Resized {
                width: 1024,
                height: 768
            })
        );
        assert!(window.poll_event().is_none());
    }

    #[test]
    fn disconnect_is_a_platform_error() {
        let mut window = HeadlessWindow::new(1, 1);
        window.controller().disconnect();
        assert!(window.pump_events().unwrap_err().is_fatal());
    }
}
