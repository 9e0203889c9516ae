use std::path::{Path, PathBuf};

use cinder_engine::device::{BlendMode, ClearColor, CullMode, DepthState, GraphicsDevice};
use cinder_engine::input::Key;
use cinder_engine::render::{Drawable, FrameReport, Material, Mesh};
use cinder_engine::resource::{
    image, BufferDescriptor, ProgramDescriptor, ResourceRegistry, TextureDescriptor,
};
use cinder_engine::scheduler::{App, AppControl, FrameRecorder, FrameState, UpdateCtx};
use cinder_engine::transform::Transform;
use glam::Vec3;

use crate::controller::FlyController;
use crate::cube;
use crate::raycast::{raycast, Hit};
use crate::world::World;

const BLOCK_SHADER: &str = include_str!("../shaders/block.wgsl");

pub const SPAWN: Vec3 = Vec3::new(0.0, 2.0, 0.0);
/// How far the player can target blocks, in blocks.
const REACH: f32 = 8.0;
const HIGHLIGHT_TINT: [f32; 4] = [1.0, 0.9, 0.0, 0.35];
const HIGHLIGHT_SCALE: f32 = 1.02;
const STATS_EVERY: u64 = 600;
/// Sky color once the camera drops under the floor.
const VOID: ClearColor = ClearColor::BLACK;

struct Assets {
    cube: Mesh,
    block: Material,
    highlight: Material,
}

impl Assets {
    fn load<D: GraphicsDevice>(
        registry: &mut ResourceRegistry<D>,
        texture: Option<&Path>,
    ) -> cinder_engine::Result<Self> {
        let (vertices, indices) = cube::unit_cube();
        let vertex_buffer = registry.create(BufferDescriptor::vertices("cube vertices", &vertices))?;
        let index_buffer = registry.create(BufferDescriptor::indices_u16("cube indices", &indices))?;
        let program = registry.create(ProgramDescriptor::wgsl("block", BLOCK_SHADER))?;

        let pixels = match texture {
            Some(path) => image::decode_file(path)?,
            None => image::DecodedImage::checkerboard(
                64,
                8,
                [106, 170, 64, 255],
                [86, 140, 52, 255],
            ),
        };
        log::info!("block texture {}x{}", pixels.width, pixels.height);
        let texture = registry.create(TextureDescriptor::from_image("block", pixels))?;

        Ok(Self {
            cube: Mesh::indexed(vertex_buffer, index_buffer, indices.len() as u32),
            block: Material::new(program).with_texture(texture),
            // Drawn last, over the block it encloses; no depth write so it
            // never hides anything.
            highlight: Material::new(program)
                .with_blend(BlendMode::Alpha)
                .with_depth(DepthState::READ_ONLY)
                .with_cull(CullMode::None)
                .with_tint(HIGHLIGHT_TINT),
        })
    }
}

/// The block-world viewer.
pub struct Game {
    world: World,
    texture: Option<PathBuf>,
    controller: FlyController,
    assets: Option<Assets>,
    target: Option<Hit>,
}

impl Game {
    pub fn new(world: World, texture: Option<PathBuf>) -> Self {
        Self {
            world,
            texture,
            controller: FlyController::default(),
            assets: None,
            target: None,
        }
    }
}

impl<D: GraphicsDevice> App<D> for Game {
    fn update(&mut self, frame: &FrameState, ctx: &mut UpdateCtx<'_, D>) -> AppControl {
        if frame.input.key_pressed(Key::Escape) {
            log::info!("escape pressed, closing");
            return AppControl::Exit;
        }

        if self.assets.is_none() {
            match Assets::load(ctx.registry(), self.texture.as_deref()) {
                Ok(assets) => self.assets = Some(assets),
                Err(e) => {
                    log::error!("failed to load assets: {e}");
                    return AppControl::Exit;
                }
            }
            ctx.camera().position = SPAWN;
            ctx.set_cursor_captured(true);
        }

        let camera = ctx.camera();
        self.controller.update(camera, &frame.input, frame.delta_time);
        let target = raycast(&self.world, camera.position, camera.forward(), REACH);
        if target.map(|h| h.block) != self.target.map(|h| h.block) {
            match target {
                Some(hit) => log::trace!("targeting {} at {:.2}", hit.block, hit.distance),
                None => log::trace!("no target"),
            }
        }
        self.target = target;
        AppControl::Continue
    }

    fn render(&mut self, _frame: &FrameState, recorder: &mut FrameRecorder<'_>) {
        let Some(assets) = &self.assets else { return };

        if recorder.camera().position.y < 0.0 {
            recorder.set_clear_color(VOID);
        }

        recorder.extend(self.world.blocks().map(|block| Drawable {
            mesh: assets.cube,
            material: assets.block,
            transform: Transform::from_translation(block.as_vec3() + Vec3::splat(0.5)),
        }));

        if let Some(hit) = self.target {
            recorder.draw(Drawable {
                mesh: assets.cube,
                material: assets.highlight,
                transform: Transform::from_translation(hit.block.as_vec3() + Vec3::splat(0.5))
                    .with_scale(Vec3::splat(HIGHLIGHT_SCALE)),
            });
        }
    }

    fn frame_completed(&mut self, report: &FrameReport) {
        for e in &report.errors {
            log::warn!("frame {}: draw {} failed: {}", report.fence.value(), e.index, e.error);
        }
        if report.fence.value() % STATS_EVERY == 0 {
            log::debug!("frame {}: {:?}", report.fence.value(), report.stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_engine::config::SchedulerConfig;
    use cinder_engine::context::Context;
    use cinder_engine::device::headless::{DeviceCall, HeadlessDevice};
    use cinder_engine::input::{InputEvent, KeyState, Modifiers};
    use cinder_engine::platform::headless::HeadlessWindow;
    use cinder_engine::scheduler::{FrameScheduler, Phase};
    use cinder_engine::surface::Surface;
    use cinder_engine::time::ManualClock;
    use glam::IVec3;

    #[test]
    fn game_runs_on_headless_backends() {
        let context = Context::acquire().unwrap();
        let window = HeadlessWindow::new(800, 600);
        let controller = window.controller();
        let surface = Surface::open(&context, Default::default(), |_| Ok(window)).unwrap();
        let device = HeadlessDevice::new();
        let probe = device.probe();
        let registry = ResourceRegistry::new(&context, device);
        let mut scheduler =
            FrameScheduler::new(surface, registry, SchedulerConfig::default(), ManualClock::new())
                .unwrap();
        let mut game = Game::new(World::flat(10, 10), None);

        // Spawned at eye height looking at the horizon: nothing targeted.
        scheduler.step(&mut game).unwrap();
        assert_eq!(scheduler.camera().position, SPAWN);
        assert!(controller.cursor_captured());
        assert_eq!(game.target, None);
        let draws = |calls: Vec<DeviceCall>| {
            calls
                .into_iter()
                .filter_map(|c| match c {
                    DeviceCall::Draw { constants, .. } => Some(constants),
                    _ => None,
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(draws(probe.last_frame_calls()).len(), 100);

        // Look straight down from above a block: it is highlighted, drawn last.
        scheduler.camera_mut().position = Vec3::new(0.5, 2.0, 0.5);
        controller.push_event(InputEvent::MouseMotion { dx: 0.0, dy: 1000.0 });
        scheduler.step(&mut game).unwrap();
        assert_eq!(game.target.map(|h| h.block), Some(IVec3::new(0, 0, 0)));
        let frame = draws(probe.last_frame_calls());
        assert_eq!(frame.len(), 101);
        assert_eq!(frame[100].tint, HIGHLIGHT_TINT);

        // Under the floor the sky goes dark.
        scheduler.camera_mut().position = Vec3::new(0.5, -3.0, 0.5);
        scheduler.step(&mut game).unwrap();
        assert!(probe
            .last_frame_calls()
            .contains(&DeviceCall::BeginFrame(VOID)));

        controller.push_event(InputEvent::Key {
            key: Key::Escape,
            state: KeyState::Pressed,
            modifiers: Modifiers::default(),
            code: 0,
            repeat: false,
        });
        assert_eq!(scheduler.step(&mut game).unwrap(), Phase::ShuttingDown);
    }
}
