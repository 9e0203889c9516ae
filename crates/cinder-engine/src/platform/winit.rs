//! winit window backend.
//!
//! The event loop is driven with `pump_app_events` so the frame scheduler owns
//! the loop; each pump processes whatever the OS has queued and returns at once.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event::{
    DeviceEvent, DeviceId, ElementState, MouseButton as WinitMouseButton, MouseScrollDelta,
    WindowEvent,
};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, ModifiersState, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{CursorGrabMode, Window, WindowAttributes, WindowId};

use crate::config::SurfaceConfig;
use crate::error::{Error, Result};
use crate::input::{
    InputEvent, Key, KeyState, Modifiers, MouseButton, MouseButtonState, MouseWheelDelta,
    PointerButtonEvent,
};

use super::WindowSystem;

/// Pumps spent waiting for the platform to hand out the window.
const CREATE_ATTEMPTS: u32 = 200;
const CREATE_PUMP_TIMEOUT: Duration = Duration::from_millis(5);

/// Frame acquired by the device and waiting to be shown.
///
/// The wgpu device fills the slot at submit; `swap_buffers` presents it.
#[derive(Clone, Default)]
pub struct PresentSlot(Arc<Mutex<Option<wgpu::SurfaceTexture>>>);

impl PresentSlot {
    pub(crate) fn put(&self, texture: wgpu::SurfaceTexture) {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if slot.replace(texture).is_some() {
            log::debug!("dropping an unpresented frame");
        }
    }

    fn take(&self) -> Option<wgpu::SurfaceTexture> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Native window backed by winit.
pub struct WinitWindow {
    event_loop: EventLoop<()>,
    handler: Handler,
    present: PresentSlot,
}

struct Handler {
    attributes: Option<WindowAttributes>,
    window: Option<Arc<Window>>,
    create_error: Option<String>,

    events: VecDeque<InputEvent>,
    modifiers: Modifiers,
    pointer: Option<(f32, f32)>,
    cursor_captured: bool,
}

impl WinitWindow {
    /// Creates the event loop and the window.
    ///
    /// Fails with `Error::Platform` when no display is available or the window
    /// cannot be created.
    pub fn open(config: &SurfaceConfig) -> Result<Self> {
        let event_loop = EventLoop::new()
            .map_err(|e| Error::Platform(format!("failed to create event loop: {e}")))?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let attributes = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(LogicalSize::new(config.width, config.height))
            .with_resizable(config.resizable);

        let mut this = Self {
            event_loop,
            handler: Handler {
                attributes: Some(attributes),
                window: None,
                create_error: None,
                events: VecDeque::new(),
                modifiers: Modifiers::default(),
                pointer: None,
                cursor_captured: false,
            },
            present: PresentSlot::default(),
        };

        // The window is created from `resumed`, which only runs inside a pump.
        for _ in 0..CREATE_ATTEMPTS {
            let status = this
                .event_loop
                .pump_app_events(Some(CREATE_PUMP_TIMEOUT), &mut this.handler);
            if let Some(e) = this.handler.create_error.take() {
                return Err(Error::Platform(format!("failed to create window: {e}")));
            }
            if this.handler.window.is_some() {
                break;
            }
            if let PumpStatus::Exit(code) = status {
                return Err(Error::Platform(format!(
                    "event loop exited with code {code} before the window opened"
                )));
            }
        }

        let Some(window) = this.handler.window.as_ref() else {
            return Err(Error::Platform("the platform never created the window".into()));
        };
        log::info!(
            "window {:?} opened at {:?} (scale {})",
            config.title,
            window.inner_size(),
            window.scale_factor()
        );
        Ok(this)
    }

    /// Shared handle to the native window, for surface creation.
    pub fn window(&self) -> Option<Arc<Window>> {
        self.handler.window.clone()
    }

    pub(crate) fn present_slot(&self) -> PresentSlot {
        self.present.clone()
    }
}

impl WindowSystem for WinitWindow {
    fn pump_events(&mut self) -> Result<()> {
        if self.handler.window.is_none() {
            return Ok(());
        }
        match self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.handler)
        {
            PumpStatus::Continue => Ok(()),
            PumpStatus::Exit(code) => {
                log::debug!("event loop exited with code {code}");
                self.handler.events.push_back(InputEvent::CloseRequested);
                Ok(())
            }
        }
    }

    fn poll_event(&mut self) -> Option<InputEvent> {
        self.handler.events.pop_front()
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        self.handler
            .window
            .as_ref()
            .map(|w| {
                let size = w.inner_size();
                (size.width, size.height)
            })
            .unwrap_or((0, 0))
    }

    fn swap_buffers(&mut self) -> Result<()> {
        let Some(frame) = self.present.take() else {
            // Nothing was acquired this frame (surface reconfigured or minimized).
            return Ok(());
        };
        if let Some(window) = &self.handler.window {
            window.pre_present_notify();
        }
        frame.present();
        Ok(())
    }

    fn set_cursor_captured(&mut self, captured: bool) {
        let Some(window) = &self.handler.window else { return };
        if captured == self.handler.cursor_captured {
            return;
        }

        let grab = if captured {
            window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
        } else {
            window.set_cursor_grab(CursorGrabMode::None)
        };
        if let Err(e) = grab {
            log::warn!("cursor grab not supported: {e}");
        }
        window.set_cursor_visible(!captured);
        self.handler.cursor_captured = captured;
    }

    fn release(&mut self) {
        drop(self.present.take());
        self.handler.events.clear();
        if let Some(window) = self.handler.window.take() {
            if Arc::strong_count(&window) > 1 {
                log::debug!("window released while a device surface still holds it");
            }
        }
        // Let the platform process the destruction.
        let _ = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.handler);
    }
}

impl ApplicationHandler for Handler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(attributes) = self.attributes.take() else { return };
        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(e) => self.create_error = Some(e.to_string()),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.clone() else { return };

        let translated = match event {
            WindowEvent::CloseRequested => Some(InputEvent::CloseRequested),

            WindowEvent::Resized(size) => Some(InputEvent::Resized {
                width: size.width,
                height: size.height,
            }),

            WindowEvent::ScaleFactorChanged { .. } => {
                let size = window.inner_size();
                Some(InputEvent::Resized {
                    width: size.width,
                    height: size.height,
                })
            }

            WindowEvent::ModifiersChanged(m) => {
                self.modifiers = map_modifiers(m.state());
                Some(InputEvent::ModifiersChanged(self.modifiers))
            }

            WindowEvent::Focused(focused) => Some(InputEvent::Focused(focused)),

            WindowEvent::CursorLeft { .. } => {
                self.pointer = None;
                Some(InputEvent::PointerLeft)
            }

            WindowEvent::CursorMoved { position, .. } => {
                let (x, y) = to_logical_f32(&window, position);
                self.pointer = Some((x, y));
                Some(InputEvent::PointerMoved { x, y })
            }

            WindowEvent::MouseInput { state, button, .. } => {
                let (x, y) = self.pointer.unwrap_or((0.0, 0.0));
                Some(InputEvent::PointerButton(PointerButtonEvent {
                    button: map_mouse_button(button),
                    state: match state {
                        ElementState::Pressed => MouseButtonState::Pressed,
                        ElementState::Released => MouseButtonState::Released,
                    },
                    x,
                    y,
                    modifiers: self.modifiers,
                }))
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let delta = match delta {
                    MouseScrollDelta::LineDelta(x, y) => MouseWheelDelta::Line { x, y },
                    MouseScrollDelta::PixelDelta(p) => {
                        let (x, y) = to_logical_f32(&window, p);
                        MouseWheelDelta::Pixel { x, y }
                    }
                };
                Some(InputEvent::MouseWheel {
                    delta,
                    modifiers: self.modifiers,
                })
            }

            WindowEvent::KeyboardInput { event, .. } => {
                let (key, code) = map_key(event.physical_key);
                Some(InputEvent::Key {
                    key,
                    state: match event.state {
                        ElementState::Pressed => KeyState::Pressed,
                        ElementState::Released => KeyState::Released,
                    },
                    modifiers: self.modifiers,
                    code,
                    repeat: event.repeat,
                })
            }

            WindowEvent::Ime(winit::event::Ime::Commit(text)) if !text.is_empty() => {
                Some(InputEvent::Text(text))
            }

            _ => None,
        };

        if let Some(ev) = translated {
            self.events.push_back(ev);
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.events.push_back(InputEvent::MouseMotion {
                dx: dx as f32,
                dy: dy as f32,
            });
        }
    }
}

fn to_logical_f32(window: &Window, pos: PhysicalPosition<f64>) -> (f32, f32) {
    let logical = pos.to_logical::<f64>(window.scale_factor());
    (logical.x as f32, logical.y as f32)
}

fn map_modifiers(m: ModifiersState) -> Modifiers {
    Modifiers {
        shift: m.shift_key(),
        ctrl: m.control_key(),
        alt: m.alt_key(),
        meta: m.super_key(),
    }
}

fn map_mouse_button(b: WinitMouseButton) -> MouseButton {
    match b {
        WinitMouseButton::Left => MouseButton::Left,
        WinitMouseButton::Right => MouseButton::Right,
        WinitMouseButton::Middle => MouseButton::Middle,
        WinitMouseButton::Back => MouseButton::Back,
        WinitMouseButton::Forward => MouseButton::Forward,
        WinitMouseButton::Other(v) => MouseButton::Other(v),
    }
}

fn map_key(pk: PhysicalKey) -> (Key, u32) {
    let PhysicalKey::Code(code) = pk else {
        return (Key::Unknown(0), 0);
    };

    let key = match code {
        KeyCode::Escape => Key::Escape,
        KeyCode::Enter => Key::Enter,
        KeyCode::Tab => Key::Tab,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Space => Key::Space,

        KeyCode::ArrowUp => Key::ArrowUp,
        KeyCode::ArrowDown => Key::ArrowDown,
        KeyCode::ArrowLeft => Key::ArrowLeft,
        KeyCode::ArrowRight => Key::ArrowRight,

        KeyCode::ShiftLeft | KeyCode::ShiftRight => Key::Shift,
        KeyCode::ControlLeft | KeyCode::ControlRight => Key::Control,
        KeyCode::AltLeft | KeyCode::AltRight => Key::Alt,
        KeyCode::SuperLeft | KeyCode::SuperRight => Key::Meta,

        KeyCode::KeyA => Key::A,
        KeyCode::KeyB => Key::B,
        KeyCode::KeyC => Key::C,
        KeyCode::KeyD => Key::D,
        KeyCode::KeyE => Key::E,
        KeyCode::KeyF => Key::F,
        KeyCode::KeyG => Key::G,
        KeyCode::KeyH => Key::H,
        KeyCode::KeyI => Key::I,
        KeyCode::KeyJ => Key::J,
        KeyCode::KeyK => Key::K,
        KeyCode::KeyL => Key::L,
        KeyCode::KeyM => Key::M,
        KeyCode::KeyN => Key::N,
        KeyCode::KeyO => Key::O,
        KeyCode::KeyP => Key::P,
        KeyCode::KeyQ => Key::Q,
        KeyCode::KeyR => Key::R,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyT => Key::T,
        KeyCode::KeyU => Key::U,
        KeyCode::KeyV => Key::V,
        KeyCode::KeyW => Key::W,
        KeyCode::KeyX => Key::X,
        KeyCode::KeyY => Key::Y,
        KeyCode::KeyZ => Key::Z,

        KeyCode::Digit0 => Key::Digit0,
        KeyCode::Digit1 => Key::Digit1,
        KeyCode::Digit2 => Key::Digit2,
        KeyCode::Digit3 => Key::Digit3,
        KeyCode::Digit4 => Key::Digit4,
        KeyCode::Digit5 => Key::Digit5,
        KeyCode::Digit6 => Key::Digit6,
        KeyCode::Digit7 => Key::Digit7,
        KeyCode::Digit8 => Key::Digit8,
        KeyCode::Digit9 => Key::Digit9,

        KeyCode::F1 => Key::F1,
        KeyCode::F2 => Key::F2,
        KeyCode::F3 => Key::F3,
        KeyCode::F4 => Key::F4,
        KeyCode::F5 => Key::F5,
        KeyCode::F6 => Key::F6,
        KeyCode::F7 => Key::F7,
        KeyCode::F8 => Key::F8,
        KeyCode::F9 => Key::F9,
        KeyCode::F10 => Key::F10,
        KeyCode::F11 => Key::F11,
        KeyCode::F12 => Key::F12,

        other => Key::Unknown(other as u32),
    };

    (key, code as u32)
}
