use crate::device::{ClearColor, GraphicsDevice};
use crate::render::{Drawable, FrameReport};
use crate::resource::{ResourceRequester, ResourceRegistry};
use crate::transform::Camera;

use super::frame::FrameState;

/// Control directive returned by `App::update`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    /// Finish this iteration, then shut down.
    Exit,
}

/// Application contract driven by `FrameScheduler`.
pub trait App<D: GraphicsDevice> {
    /// Advances simulation state. Runs after input is polled, once per iteration.
    fn update(&mut self, frame: &FrameState, ctx: &mut UpdateCtx<'_, D>) -> AppControl;

    /// Records this frame's drawables, in submission order.
    fn render(&mut self, frame: &FrameState, recorder: &mut FrameRecorder<'_>);

    /// Called after the frame has been submitted and presented.
    fn frame_completed(&mut self, report: &FrameReport) {
        let _ = report;
    }
}

/// What the update callback may touch.
pub struct UpdateCtx<'a, D: GraphicsDevice> {
    registry: &'a mut ResourceRegistry<D>,
    camera: &'a mut Camera,
    pub(super) cursor_captured: Option<bool>,
}

impl<'a, D: GraphicsDevice> UpdateCtx<'a, D> {
    pub(super) fn new(registry: &'a mut ResourceRegistry<D>, camera: &'a mut Camera) -> Self {
        Self {
            registry,
            camera,
            cursor_captured: None,
        }
    }

    /// Resources may be created, updated and destroyed here; objects referenced
    /// by frames still in flight are released later.
    pub fn registry(&mut self) -> &mut ResourceRegistry<D> {
        self.registry
    }

    pub fn requester(&self) -> ResourceRequester {
        self.registry.requester()
    }

    pub fn camera(&mut self) -> &mut Camera {
        self.camera
    }

    /// Applied to the surface once `update` returns.
    pub fn set_cursor_captured(&mut self, captured: bool) {
        self.cursor_captured = Some(captured);
    }
}

/// Collects the draw list of one frame.
pub struct FrameRecorder<'a> {
    camera: &'a Camera,
    pub(super) drawables: Vec<Drawable>,
    pub(super) clear: ClearColor,
}

impl<'a> FrameRecorder<'a> {
    pub(super) fn new(camera: &'a Camera, drawables: Vec<Drawable>, clear: ClearColor) -> Self {
        Self {
            camera,
            drawables,
            clear,
        }
    }

    /// Camera the frame is rendered with.
    pub fn camera(&self) -> &Camera {
        self.camera
    }

    pub fn draw(&mut self, drawable: Drawable) {
        self.drawables.push(drawable);
    }

    pub fn extend(&mut self, drawables: impl IntoIterator<Item = Drawable>) {
        self.drawables.extend(drawables);
    }

    /// Overrides the configured clear color for this frame only.
    pub fn set_clear_color(&mut self, clear: ClearColor) {
        self.clear = clear;
    }

    pub fn len(&self) -> usize {
        self.drawables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drawables.is_empty()
    }
}
