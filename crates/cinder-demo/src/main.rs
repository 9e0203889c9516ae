//! First-person block world on the cinder engine.
//!
//! Mouse to look, WASD to move, Space/Shift to fly up and down, Escape to quit.

mod controller;
mod cube;
mod game;
mod raycast;
mod world;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

use cinder_engine::config::EngineConfig;
use cinder_engine::context::Context;
use cinder_engine::device::gpu::{GpuInit, WgpuDevice};
use cinder_engine::device::ClearColor;
use cinder_engine::logging::{init_logging, LoggingConfig};
use cinder_engine::platform::winit::WinitWindow;
use cinder_engine::resource::ResourceRegistry;
use cinder_engine::scheduler::FrameScheduler;
use cinder_engine::surface::Surface;
use cinder_engine::time::MonotonicClock;

use game::Game;
use world::World;

const WORLD_SIZE: i32 = 10;

#[derive(Debug, Parser)]
#[command(name = "cinder-demo", version, about = "First-person block world")]
struct Args {
    /// Engine configuration (TOML). Built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Block texture (png, jpeg, bmp or gif). A checkerboard when omitted.
    #[arg(long)]
    texture: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "info,cinder_engine=trace".
    #[arg(long)]
    log: Option<String>,
}

fn default_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.surface.title = "cinder blocks".to_owned();
    config.scheduler.clear_color = ClearColor::rgb(0.2, 0.4, 0.6);
    config
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => default_config(),
    };

    init_logging(LoggingConfig {
        filter: args.log.clone().or_else(|| config.log.clone()),
        ..Default::default()
    });

    let context = Context::acquire()?;
    let surface = Surface::open(&context, config.surface.clone(), WinitWindow::open)
        .context("failed to open the window")?;
    let device = WgpuDevice::new(surface.window(), GpuInit::for_vsync(config.surface.vsync))
        .context("failed to initialize the GPU")?;
    log::info!("surface format {:?}", device.surface_format());

    let registry = ResourceRegistry::new(&context, device);
    let mut scheduler =
        FrameScheduler::new(surface, registry, config.scheduler.clone(), MonotonicClock)?;

    let world = World::flat(WORLD_SIZE, WORLD_SIZE);
    log::info!("world of {} blocks", world.len());
    let mut game = Game::new(world, args.texture);
    scheduler.run(&mut game).context("frame loop failed")?;

    log::info!("bye");
    Ok(())
}
