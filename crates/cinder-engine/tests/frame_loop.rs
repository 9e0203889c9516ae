//! End-to-end frame loop scenarios on the headless backends.

use std::io::Cursor;
use std::sync::{Mutex, MutexGuard};

use glam::Vec3;

use cinder_engine::config::SchedulerConfig;
use cinder_engine::context::Context;
use cinder_engine::device::headless::{DeviceCall, HeadlessDevice, HeadlessProbe};
use cinder_engine::device::{DrawConstants, GraphicsDevice};
use cinder_engine::platform::headless::{HeadlessController, HeadlessWindow};
use cinder_engine::render::{Drawable, FrameReport, Material, Mesh, Vertex};
use cinder_engine::resource::{
    image, BufferDescriptor, PendingResource, ProgramDescriptor, ResourceHandle,
    ResourceRegistry, TextureDescriptor,
};
use cinder_engine::scheduler::{
    App, AppControl, FrameRecorder, FrameScheduler, FrameState, Phase, UpdateCtx,
};
use cinder_engine::surface::Surface;
use cinder_engine::time::ManualClock;
use cinder_engine::transform::Transform;
use cinder_engine::Error;

/// Only one context may be live per process; tests in this binary take turns.
static CONTEXT: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    CONTEXT.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

const SHADER: &str = r#"
struct Draw {
    mvp: mat4x4<f32>,
    model: mat4x4<f32>,
    normal: mat4x4<f32>,
    tint: vec4<f32>,
};

@group(0) @binding(0) var<uniform> draw: Draw;
@group(1) @binding(0) var albedo: texture_2d<f32>;
@group(1) @binding(1) var albedo_sampler: sampler;

struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) normal: vec3<f32>, @location(2) uv: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.clip = draw.mvp * vec4<f32>(position, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    return textureSample(albedo, albedo_sampler, in.uv) * draw.tint;
}
"#;

fn png_bytes(size: u32) -> Vec<u8> {
    let img = ::image::RgbaImage::from_fn(size, size, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            ::image::Rgba([90, 160, 60, 255])
        } else {
            ::image::Rgba([120, 85, 50, 255])
        }
    });
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ::image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn quad() -> (Vec<Vertex>, Vec<u16>) {
    let v = |x: f32, y: f32, u: f32, w: f32| Vertex {
        position: [x, y, 0.0],
        normal: [0.0, 0.0, 1.0],
        uv: [u, w],
    };
    (
        vec![
            v(-0.5, -0.5, 0.0, 1.0),
            v(0.5, -0.5, 1.0, 1.0),
            v(0.5, 0.5, 1.0, 0.0),
            v(-0.5, 0.5, 0.0, 0.0),
        ],
        vec![0, 1, 2, 2, 3, 0],
    )
}

struct Assets {
    mesh: Mesh,
    program: ResourceHandle,
    grass: ResourceHandle,
    dirt: ResourceHandle,
}

fn load_assets<D: GraphicsDevice>(registry: &mut ResourceRegistry<D>) -> Assets {
    let (vertices, indices) = quad();
    let vb = registry
        .create(BufferDescriptor::vertices("quad vertices", &vertices))
        .unwrap();
    let ib = registry
        .create(BufferDescriptor::indices_u16("quad indices", &indices))
        .unwrap();
    let program = registry
        .create(ProgramDescriptor::wgsl("textured", SHADER))
        .unwrap();
    let decoded = image::decode(&png_bytes(64)).unwrap();
    assert_eq!((decoded.width, decoded.height), (64, 64));
    let grass = registry
        .create(TextureDescriptor::from_image("grass", decoded))
        .unwrap();
    let dirt = registry
        .create(TextureDescriptor::from_image(
            "dirt",
            image::DecodedImage::checkerboard(16, 4, [120, 85, 50, 255], [90, 60, 35, 255]),
        ))
        .unwrap();
    Assets {
        mesh: Mesh::indexed(vb, ib, indices.len() as u32),
        program,
        grass,
        dirt,
    }
}

/// Three textured quads in front of the camera; the last one uses `dirt`.
#[derive(Default)]
struct Scene {
    assets: Option<Assets>,
    extra_quads: usize,
    destroy_dirt_at: Option<u64>,
    exit_after: Option<u64>,
    pending: Option<PendingResource>,
    resolved: Option<ResourceHandle>,
    reports: Vec<FrameReport>,
}

impl<D: GraphicsDevice> App<D> for Scene {
    fn update(&mut self, frame: &FrameState, ctx: &mut UpdateCtx<'_, D>) -> AppControl {
        if self.assets.is_none() {
            self.assets = Some(load_assets(ctx.registry()));
            ctx.camera().position = Vec3::new(0.0, 0.0, 3.0);
        }
        if let Some(pending) = &self.pending {
            if let Some(result) = pending.try_get() {
                self.resolved = Some(result.unwrap());
                self.pending = None;
            }
        }
        if self.destroy_dirt_at == Some(frame.frame_index) {
            let dirt = self.assets.as_ref().unwrap().dirt;
            ctx.registry().destroy(dirt);
        }
        match self.exit_after {
            Some(n) if frame.frame_index + 1 >= n => AppControl::Exit,
            _ => AppControl::Continue,
        }
    }

    fn render(&mut self, _frame: &FrameState, recorder: &mut FrameRecorder<'_>) {
        let Some(assets) = &self.assets else { return };
        let grass = Material::new(assets.program).with_texture(assets.grass);
        let dirt = Material::new(assets.program).with_texture(assets.dirt);
        let quad = |x: f32, material: Material| Drawable {
            mesh: assets.mesh,
            material,
            transform: Transform::from_translation(Vec3::new(x, 0.0, 0.0)),
        };

        recorder.draw(quad(-1.0, grass));
        recorder.draw(quad(0.0, grass));
        recorder.draw(quad(1.0, dirt));
        for i in 0..self.extra_quads {
            recorder.draw(quad(i as f32 * 0.01, grass));
        }
    }

    fn frame_completed(&mut self, report: &FrameReport) {
        self.reports.push(report.clone());
    }
}

struct Harness {
    scheduler: FrameScheduler<HeadlessWindow, HeadlessDevice, ManualClock>,
    window: HeadlessController,
    device: HeadlessProbe,
}

fn harness(config: SchedulerConfig) -> Harness {
    let context = Context::acquire().unwrap();
    let window = HeadlessWindow::new(800, 600);
    let controller = window.controller();
    let surface = Surface::open(&context, Default::default(), |_| Ok(window)).unwrap();
    let device = HeadlessDevice::new();
    let probe = device.probe();
    let registry = ResourceRegistry::new(&context, device);
    let scheduler = FrameScheduler::new(surface, registry, config, ManualClock::new()).unwrap();
    Harness {
        scheduler,
        window: controller,
        device: probe,
    }
}

#[test]
fn textured_scene_renders_three_frames() {
    let _serial = serial();
    let mut h = harness(SchedulerConfig::default());
    let mut scene = Scene {
        exit_after: Some(3),
        ..Default::default()
    };

    h.scheduler.run(&mut scene).unwrap();

    let fences: Vec<u64> = scene.reports.iter().map(|r| r.fence.value()).collect();
    assert_eq!(fences, vec![1, 2, 3]);
    for report in &scene.reports {
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert!(report.target_acquired);
        assert_eq!(report.stats.draws, 3);
    }
    assert_eq!(h.window.presents(), 3);
    assert_eq!(h.scheduler.phase(), Phase::ShuttingDown);
    // Shutdown releases everything the scene created.
    assert_eq!(h.device.live_objects(), 0);
}

#[test]
fn shared_state_is_bound_once_per_frame() {
    let _serial = serial();
    let mut h = harness(SchedulerConfig::default());
    let mut scene = Scene::default();

    h.scheduler.step(&mut scene).unwrap();
    let frame = h.device.last_frame_calls();
    let programs = frame
        .iter()
        .filter(|c| matches!(c, DeviceCall::BindProgram(_)))
        .count();
    let textures = frame
        .iter()
        .filter(|c| matches!(c, DeviceCall::BindTexture(_)))
        .count();
    let draws = frame
        .iter()
        .filter(|c| matches!(c, DeviceCall::Draw { .. }))
        .count();
    assert_eq!((programs, textures, draws), (1, 2, 3));

    let stats = scene.reports[0].stats;
    assert_eq!(stats.state_changes, 8);
    assert_eq!(stats.state_changes_elided, 13);
}

#[test]
fn destroyed_texture_skips_its_draw_and_the_frame_still_presents() {
    let _serial = serial();
    let mut h = harness(SchedulerConfig::default());
    let mut scene = Scene {
        destroy_dirt_at: Some(1),
        ..Default::default()
    };

    h.scheduler.step(&mut scene).unwrap();
    let live_before = h.device.live_objects();
    h.scheduler.step(&mut scene).unwrap();

    let report = &scene.reports[1];
    assert_eq!(report.stats.draws, 2);
    assert_eq!(report.stats.skipped, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].index, 2);
    assert!(matches!(report.errors[0].error, Error::StaleHandle(_)));
    assert_eq!(h.window.presents(), 2);

    // Frame 1 has completed, so the texture was released on the spot.
    h.scheduler.step(&mut scene).unwrap();
    assert_eq!(h.device.live_objects(), live_before - 1);
    assert_eq!(h.scheduler.registry().stats().pending_destruction, 0);
}

#[test]
fn in_flight_texture_is_released_after_its_fence() {
    let _serial = serial();
    let mut h = harness(SchedulerConfig::default());
    h.device.set_fence_lag(2);
    let mut scene = Scene {
        destroy_dirt_at: Some(1),
        ..Default::default()
    };

    h.scheduler.step(&mut scene).unwrap();
    h.scheduler.step(&mut scene).unwrap();
    assert_eq!(h.scheduler.registry().stats().pending_destruction, 1);

    for _ in 0..3 {
        h.scheduler.step(&mut scene).unwrap();
    }
    assert_eq!(h.scheduler.registry().stats().pending_destruction, 0);
}

#[test]
fn large_batches_use_the_parallel_transform_path() {
    let _serial = serial();
    let mut h = harness(SchedulerConfig {
        parallel_transform_threshold: 16,
        ..Default::default()
    });
    let mut scene = Scene {
        extra_quads: 61,
        ..Default::default()
    };

    h.scheduler.step(&mut scene).unwrap();
    assert_eq!(scene.reports[0].stats.draws, 64);

    // Draw order and matrices match submission order.
    let constants: Vec<DrawConstants> = h
        .device
        .last_frame_calls()
        .into_iter()
        .filter_map(|c| match c {
            DeviceCall::Draw { constants, .. } => Some(constants),
            _ => None,
        })
        .collect();
    assert_eq!(constants.len(), 64);
    assert_eq!(constants[0].model[3][0], -1.0);
    assert_eq!(constants[2].model[3][0], 1.0);
    assert_eq!(constants[63].model[3][0], 60.0 * 0.01);
}

#[test]
fn requests_from_other_threads_resolve_next_frame() {
    let _serial = serial();
    let mut h = harness(SchedulerConfig::default());
    let mut scene = Scene::default();
    let requester = h.scheduler.registry().requester();

    let pending = std::thread::spawn(move || {
        requester.create(TextureDescriptor::from_image(
            "streamed",
            image::DecodedImage::checkerboard(32, 8, [255; 4], [0, 0, 0, 255]),
        ))
    })
    .join()
    .unwrap();
    scene.pending = Some(pending);

    h.scheduler.step(&mut scene).unwrap();
    let handle = scene.resolved.expect("request applied before update");
    assert!(h.scheduler.registry().contains(handle));
    assert_eq!(h.scheduler.registry().extent(handle).unwrap(), 32 * 32 * 4);
}

#[test]
fn handles_do_not_survive_their_context() {
    let _serial = serial();
    let stale = {
        let mut h = harness(SchedulerConfig::default());
        let mut scene = Scene::default();
        h.scheduler.step(&mut scene).unwrap();
        scene.assets.unwrap().grass
    };

    let mut h = harness(SchedulerConfig::default());
    let mut scene = Scene::default();
    h.scheduler.step(&mut scene).unwrap();

    assert!(!h.scheduler.registry().contains(stale));
    assert_eq!(
        h.scheduler.registry().extent(stale),
        Err(Error::StaleHandle(stale))
    );
}

#[test]
fn shrinking_to_zero_keeps_the_loop_alive() {
    let _serial = serial();
    let mut h = harness(SchedulerConfig::default());
    let mut scene = Scene::default();

    h.scheduler.step(&mut scene).unwrap();
    h.window.resize(0, 0);
    assert_eq!(h.scheduler.step(&mut scene).unwrap(), Phase::Presented);
    h.window.resize(640, 480);
    assert_eq!(h.scheduler.step(&mut scene).unwrap(), Phase::Presented);

    assert_eq!(h.device.size(), (640, 480));
    let fences: Vec<u64> = scene.reports.iter().map(|r| r.fence.value()).collect();
    assert_eq!(fences, vec![1, 2, 3]);
    assert_eq!(scene.reports[2].stats.draws, 3);
}
