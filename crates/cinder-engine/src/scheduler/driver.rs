use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::config::SchedulerConfig;
use crate::device::GraphicsDevice;
use crate::error::{Error, Result};
use crate::input::{InputEvent, InputFrame, InputSnapshot, InputState};
use crate::platform::WindowSystem;
use crate::render::{Drawable, FrameReport, Renderer};
use crate::resource::ResourceRegistry;
use crate::surface::Surface;
use crate::time::{FrameClock, MonotonicClock, TimeSource};
use crate::transform::{Camera, TransformPipeline};

use super::app::{App, AppControl, FrameRecorder, UpdateCtx};
use super::frame::FrameState;
use super::phase::Phase;

/// Owns the surface, the registry and the renderer, and runs the frame loop.
///
/// Dropping the scheduler releases device objects before the window.
pub struct FrameScheduler<W: WindowSystem, D: GraphicsDevice, T: TimeSource = MonotonicClock> {
    surface: Surface<W>,
    registry: ResourceRegistry<D>,
    renderer: Renderer,
    transforms: TransformPipeline,
    clock: FrameClock<T>,
    config: SchedulerConfig,
    camera: Camera,

    input_state: InputState,
    input_frame: InputFrame,
    drawables: Vec<Drawable>,

    phase: Phase,
    applied_size: (u32, u32),
    close: Arc<AtomicBool>,
    last_report: Option<FrameReport>,
    shut_down: bool,
}

impl<W: WindowSystem, D: GraphicsDevice, T: TimeSource> FrameScheduler<W, D, T> {
    /// Fails with `Error::Platform` if `surface` and `registry` were opened
    /// against different contexts.
    pub fn new(
        surface: Surface<W>,
        mut registry: ResourceRegistry<D>,
        config: SchedulerConfig,
        time: T,
    ) -> Result<Self> {
        if surface.context().epoch() != registry.context().epoch() {
            return Err(Error::Platform(
                "surface and resource registry belong to different contexts".into(),
            ));
        }
        registry.context().ensure_alive()?;

        let applied_size = surface.current_size();
        registry.device_mut().resize(applied_size.0, applied_size.1);

        let mut camera = Camera::default();
        camera.projection.set_viewport(applied_size.0, applied_size.1);

        let clock = FrameClock::with_clamps(time, config.min_delta(), config.max_delta());
        let transforms = TransformPipeline::new(config.parallel_transform_threshold);

        Ok(Self {
            surface,
            registry,
            renderer: Renderer::new(),
            transforms,
            clock,
            config,
            camera,
            input_state: InputState::default(),
            input_frame: InputFrame::default(),
            drawables: Vec::new(),
            phase: Phase::Idle,
            applied_size,
            close: Arc::new(AtomicBool::new(false)),
            last_report: None,
            shut_down: false,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn registry(&self) -> &ResourceRegistry<D> {
        &self.registry
    }

    pub fn surface(&self) -> &Surface<W> {
        &self.surface
    }

    pub fn transforms(&self) -> &TransformPipeline {
        &self.transforms
    }

    /// Report of the most recently presented frame.
    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    /// Flag that requests a close at the next iteration boundary. May be set
    /// from any thread.
    pub fn close_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.close)
    }

    pub fn request_close(&self) {
        self.close.store(true, Ordering::Release);
    }

    fn close_requested(&self) -> bool {
        self.close.load(Ordering::Acquire)
    }

    /// Runs iterations until a close request or a fatal error, then shuts down.
    ///
    /// Fatal errors (`Error::is_fatal`) are returned after shutdown completes.
    pub fn run<A: App<D>>(&mut self, app: &mut A) -> Result<()> {
        log::info!("frame loop started");
        let result = loop {
            match self.step(app) {
                Ok(Phase::ShuttingDown) => break Ok(()),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        };
        self.shutdown();
        if let Err(e) = &result {
            log::error!("frame loop stopped: {e}");
        } else {
            log::info!("frame loop finished after {} frame(s)", self.clock.frame_index());
        }
        result
    }

    /// Runs one full iteration and returns the phase it ended in:
    /// `Presented`, or `ShuttingDown` once a close request has been honored.
    ///
    /// Any error escaping an iteration ends the loop; the scheduler moves to
    /// `ShuttingDown` and the error is returned.
    pub fn step<A: App<D>>(&mut self, app: &mut A) -> Result<Phase> {
        if self.phase.is_terminal() {
            return Ok(Phase::ShuttingDown);
        }
        if self.close_requested() || self.surface.is_closed() {
            self.enter(Phase::ShuttingDown);
            return Ok(Phase::ShuttingDown);
        }

        if let Err(e) = self.iterate(app) {
            self.enter(Phase::ShuttingDown);
            return Err(e);
        }

        if self.close_requested() {
            log::info!("close requested; shutting down after frame {}", self.clock.frame_index());
            self.enter(Phase::ShuttingDown);
        }
        Ok(self.phase)
    }

    fn iterate<A: App<D>>(&mut self, app: &mut A) -> Result<()> {
        let started = self.clock.source().now();
        self.registry.context().ensure_alive()?;

        if self.phase == Phase::Idle {
            // Setup time before the first iteration is not a frame.
            self.clock.rebase();
        }

        self.enter(Phase::Polling);
        self.input_frame.clear();
        for event in self.surface.poll_events()? {
            if event == InputEvent::CloseRequested {
                self.close.store(true, Ordering::Release);
            }
            self.input_state.apply_event(&mut self.input_frame, event);
        }
        let resized = self.apply_surface_size();
        let time = self.clock.tick();

        self.enter(Phase::Updating);
        self.registry.drain_requests();
        self.registry.collect_garbage();

        let frame = FrameState {
            delta_time: time.dt,
            elapsed: time.elapsed,
            frame_index: time.frame_index,
            input: InputSnapshot {
                state: self.input_state.clone(),
                frame: self.input_frame.clone(),
            },
            surface_size: self.applied_size,
            resized,
        };

        let mut ctx = UpdateCtx::new(&mut self.registry, &mut self.camera);
        let control = app.update(&frame, &mut ctx);
        let cursor = ctx.cursor_captured;
        if let Some(captured) = cursor {
            self.surface.set_cursor_captured(captured);
        }
        if control == AppControl::Exit {
            self.request_close();
        }
        // Update may have replaced the camera's projection wholesale.
        self.camera
            .projection
            .set_viewport(self.applied_size.0, self.applied_size.1);

        self.enter(Phase::Recording);
        let mut drawables = std::mem::take(&mut self.drawables);
        drawables.clear();
        let mut recorder = FrameRecorder::new(&self.camera, drawables, self.config.clear_color);
        app.render(&frame, &mut recorder);
        let FrameRecorder {
            drawables, clear, ..
        } = recorder;

        let matrices = self.transforms.compute_batch(&self.camera, &drawables);

        self.renderer.begin_frame(&mut self.registry, clear)?;
        for (drawable, m) in drawables.iter().zip(&matrices) {
            if let Err(e) = self.renderer.draw(&mut self.registry, drawable, m) {
                if e.is_fatal() {
                    return Err(e);
                }
            }
        }
        let report = self.renderer.end_frame(&mut self.registry)?;
        self.drawables = drawables;
        self.enter(Phase::Submitted);

        if let Err(e) = self.surface.present() {
            if e.is_fatal() {
                return Err(e);
            }
            log::warn!("present failed: {e}");
        }
        self.enter(Phase::Presented);

        app.frame_completed(&report);
        self.last_report = Some(report);

        self.pace(started);
        Ok(())
    }

    /// Applies the latest surface size to the device and projection, once.
    fn apply_surface_size(&mut self) -> bool {
        let size = self.surface.current_size();
        if size == self.applied_size {
            return false;
        }
        log::debug!(
            "surface resized {}x{} -> {}x{}",
            self.applied_size.0,
            self.applied_size.1,
            size.0,
            size.1
        );
        self.registry.device_mut().resize(size.0, size.1);
        self.camera.projection.set_viewport(size.0, size.1);
        self.applied_size = size;
        true
    }

    fn pace(&self, started: Instant) {
        let Some(budget) = self.config.frame_budget() else {
            return;
        };
        let source = self.clock.source();
        let spent = source.now().saturating_duration_since(started);
        if spent < budget {
            source.sleep(budget - spent);
        }
    }

    fn enter(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "invalid phase transition {} -> {}",
            self.phase,
            next
        );
        if next == Phase::ShuttingDown && self.phase != next {
            log::debug!("scheduler {} -> {}", self.phase, next);
        } else {
            log::trace!("scheduler {} -> {}", self.phase, next);
        }
        self.phase = next;
    }

    /// Releases every device object, then the window. Idempotent; also run on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        if !self.phase.is_terminal() {
            self.enter(Phase::ShuttingDown);
        }
        self.registry.shutdown();
        self.surface.close();
    }
}

impl<W: WindowSystem, D: GraphicsDevice, T: TimeSource> Drop for FrameScheduler<W, D, T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::context::{test_lock, Context};
    use crate::device::headless::{DeviceCall, HeadlessDevice, HeadlessProbe};
    use crate::input::{Key, KeyState, Modifiers};
    use crate::platform::headless::{HeadlessController, HeadlessWindow};
    use crate::time::ManualClock;

    type Scheduler = FrameScheduler<HeadlessWindow, HeadlessDevice, ManualClock>;

    struct Harness {
        scheduler: Scheduler,
        window: HeadlessController,
        device: HeadlessProbe,
        time: ManualClock,
    }

    fn harness() -> Harness {
        harness_with(SchedulerConfig::default())
    }

    fn harness_with(config: SchedulerConfig) -> Harness {
        let context = Context::acquire().unwrap();
        let window = HeadlessWindow::new(800, 600);
        let controller = window.controller();
        let surface = Surface::open(&context, Default::default(), |_| Ok(window)).unwrap();
        let device = HeadlessDevice::new();
        let probe = device.probe();
        let registry = ResourceRegistry::new(&context, device);
        let time = ManualClock::new();
        let scheduler =
            FrameScheduler::new(surface, registry, config, time.clone()).unwrap();
        Harness {
            scheduler,
            window: controller,
            device: probe,
            time,
        }
    }

    #[derive(Default)]
    struct Recorder {
        frames: Vec<FrameState>,
        reports: Vec<FrameReport>,
        exit_after: Option<u64>,
    }

    impl<D: GraphicsDevice> App<D> for Recorder {
        fn update(&mut self, frame: &FrameState, _ctx: &mut UpdateCtx<'_, D>) -> AppControl {
            self.frames.push(frame.clone());
            match self.exit_after {
                Some(n) if frame.frame_index + 1 >= n => AppControl::Exit,
                _ => AppControl::Continue,
            }
        }

        fn render(&mut self, _frame: &FrameState, _recorder: &mut FrameRecorder<'_>) {}

        fn frame_completed(&mut self, report: &FrameReport) {
            self.reports.push(report.clone());
        }
    }

    /// Spends `work` of simulated time in every update.
    struct Busy {
        time: ManualClock,
        work: Duration,
    }

    impl<D: GraphicsDevice> App<D> for Busy {
        fn update(&mut self, _frame: &FrameState, _ctx: &mut UpdateCtx<'_, D>) -> AppControl {
            self.time.advance(self.work);
            AppControl::Continue
        }

        fn render(&mut self, _frame: &FrameState, _recorder: &mut FrameRecorder<'_>) {}
    }

    #[test]
    fn frame_cap_sleeps_out_the_budget() {
        let _guard = test_lock();
        let config = SchedulerConfig {
            target_fps: Some(50),
            ..SchedulerConfig::default()
        };
        let mut h = harness_with(config);
        let mut app = Busy {
            time: h.time.clone(),
            work: Duration::from_millis(5),
        };

        h.scheduler.step(&mut app).unwrap();
        assert_eq!(h.time.elapsed(), Duration::from_millis(20));

        app.work = Duration::from_millis(30);
        h.scheduler.step(&mut app).unwrap();
        assert_eq!(h.time.elapsed(), Duration::from_millis(50));
    }

    #[test]
    fn iteration_ends_presented_with_increasing_fences() {
        let _guard = test_lock();
        let mut h = harness();
        let mut app = Recorder::default();

        assert_eq!(h.scheduler.phase(), Phase::Idle);
        for _ in 0..3 {
            assert_eq!(h.scheduler.step(&mut app).unwrap(), Phase::Presented);
        }
        let fences: Vec<u64> = app.reports.iter().map(|r| r.fence.value()).collect();
        assert_eq!(fences, vec![1, 2, 3]);
        assert_eq!(h.window.presents(), 3);
        assert_eq!(h.device.frames_submitted(), 3);
    }

    #[test]
    fn delta_time_is_clamped_after_a_long_pause() {
        let _guard = test_lock();
        let mut h = harness();
        let mut app = Recorder::default();

        h.scheduler.step(&mut app).unwrap();
        h.time.advance(Duration::from_secs(5));
        h.scheduler.step(&mut app).unwrap();
        h.time.advance(Duration::from_millis(16));
        h.scheduler.step(&mut app).unwrap();

        assert_eq!(app.frames[1].delta_time, 0.1);
        assert_eq!(app.frames[2].delta_time, Duration::from_millis(16).as_secs_f32());
        assert!(app.frames[2].elapsed > 0.116 && app.frames[2].elapsed < 0.117);
    }

    #[test]
    fn close_mid_frame_finishes_the_iteration() {
        let _guard = test_lock();
        let mut h = harness();
        let mut app = Recorder::default();

        h.window.request_close();
        assert_eq!(h.scheduler.step(&mut app).unwrap(), Phase::ShuttingDown);
        assert_eq!(app.frames.len(), 1, "the polled frame still runs");
        assert_eq!(h.window.presents(), 1);

        assert_eq!(h.scheduler.step(&mut app).unwrap(), Phase::ShuttingDown);
        assert_eq!(app.frames.len(), 1);
    }

    #[test]
    fn app_exit_runs_to_completion() {
        let _guard = test_lock();
        let mut h = harness();
        let mut app = Recorder {
            exit_after: Some(4),
            ..Default::default()
        };
        h.scheduler.run(&mut app).unwrap();
        assert_eq!(app.reports.len(), 4);
        assert_eq!(h.window.releases(), 1);
        assert!(h.device.calls().contains(&DeviceCall::WaitIdle));
    }

    #[test]
    fn resize_is_applied_once_per_iteration() {
        let _guard = test_lock();
        let mut h = harness();
        let mut app = Recorder::default();

        h.window.resize(1024, 768);
        h.window.resize(1280, 720);
        h.scheduler.step(&mut app).unwrap();
        h.scheduler.step(&mut app).unwrap();

        let resizes: Vec<_> = h
            .device
            .calls()
            .into_iter()
            .filter(|c| matches!(c, DeviceCall::Resize { .. }))
            .collect();
        assert_eq!(
            resizes,
            vec![
                DeviceCall::Resize {
                    width: 800,
                    height: 600
                },
                DeviceCall::Resize {
                    width: 1280,
                    height: 720
                },
            ]
        );
        assert!(app.frames[0].resized);
        assert_eq!(app.frames[0].surface_size, (1280, 720));
        assert!(!app.frames[1].resized);
        assert!((h.scheduler.camera().projection.aspect - 1280.0 / 720.0).abs() < 1e-6);
    }

    #[test]
    fn input_reaches_update_in_order() {
        let _guard = test_lock();
        let mut h = harness();
        let mut app = Recorder::default();
        let key = |state| InputEvent::Key {
            key: Key::W,
            state,
            modifiers: Modifiers::default(),
            code: 0,
            repeat: false,
        };

        h.window.push_event(key(KeyState::Pressed));
        h.window.push_event(InputEvent::MouseMotion { dx: 3.0, dy: -1.0 });
        h.scheduler.step(&mut app).unwrap();
        h.scheduler.step(&mut app).unwrap();

        let first = &app.frames[0].input;
        assert!(first.key_pressed(Key::W));
        assert_eq!(first.mouse_delta(), (3.0, -1.0));
        assert_eq!(first.frame.events.len(), 2);

        let second = &app.frames[1].input;
        assert!(second.key_down(Key::W));
        assert!(!second.key_pressed(Key::W));
        assert_eq!(second.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn device_loss_shuts_down_with_error() {
        let _guard = test_lock();
        let mut h = harness();
        let mut app = Recorder::default();

        h.scheduler.step(&mut app).unwrap();
        h.device.lose_device();
        let err = h.scheduler.run(&mut app).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(h.scheduler.phase(), Phase::ShuttingDown);
        assert_eq!(h.window.releases(), 1);
    }

    #[test]
    fn platform_failure_is_fatal() {
        let _guard = test_lock();
        let mut h = harness();
        let mut app = Recorder::default();

        h.window.disconnect();
        let err = h.scheduler.step(&mut app).unwrap_err();
        assert!(matches!(err, Error::Platform(_)));
        assert_eq!(h.scheduler.phase(), Phase::ShuttingDown);
    }

    #[test]
    fn close_handle_works_across_threads() {
        let _guard = test_lock();
        let mut h = harness();
        let mut app = Recorder::default();

        let handle = h.scheduler.close_handle();
        std::thread::spawn(move || handle.store(true, Ordering::Release))
            .join()
            .unwrap();
        assert_eq!(h.scheduler.step(&mut app).unwrap(), Phase::ShuttingDown);
        assert!(app.frames.is_empty());
    }
}
