//! Engine configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! log = "info,cinder_engine=debug"
//!
//! [surface]
//! width = 1280
//! height = 720
//! title = "cinder"
//! vsync = true
//! resizable = true
//!
//! [scheduler]
//! max_delta_ms = 100
//! min_delta_us = 100
//! target_fps = 144
//! clear_color = { r = 0.45, g = 0.65, b = 0.9, a = 1.0 }
//! parallel_transform_threshold = 256
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::device::ClearColor;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub surface: SurfaceConfig,
    pub scheduler: SchedulerConfig,
    /// `env_logger` filter; overrides `RUST_LOG` when set.
    pub log: Option<String>,
}

/// Options recognized when opening a surface.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SurfaceConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub vsync: bool,
    pub resizable: bool,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "cinder".to_owned(),
            vsync: true,
            resizable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Upper clamp for a frame's delta time.
    pub max_delta_ms: u64,
    /// Lower clamp for a frame's delta time.
    pub min_delta_us: u64,
    /// Sleep after present to stay under this rate. `None` runs uncapped
    /// (or at the display rate with vsync).
    pub target_fps: Option<u32>,
    pub clear_color: ClearColor,
    /// Drawable count above which matrices are computed on worker threads.
    pub parallel_transform_threshold: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_delta_ms: 100,
            min_delta_us: 100,
            target_fps: None,
            clear_color: ClearColor::default(),
            parallel_transform_threshold: 256,
        }
    }
}

impl SchedulerConfig {
    pub fn max_delta(&self) -> Duration {
        Duration::from_millis(self.max_delta_ms)
    }

    pub fn min_delta(&self) -> Duration {
        Duration::from_micros(self.min_delta_us)
    }

    /// Minimum wall time per frame implied by `target_fps`.
    pub fn frame_budget(&self) -> Option<Duration> {
        self.target_fps
            .filter(|fps| *fps > 0)
            .map(|fps| Duration::from_secs(1) / fps)
    }
}

impl EngineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(input).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<()> {
        if self.surface.width == 0 || self.surface.height == 0 {
            return Err(Error::Config(format!(
                "surface size {}x{} is empty",
                self.surface.width, self.surface.height
            )));
        }
        let s = &self.scheduler;
        if s.max_delta() < s.min_delta() {
            return Err(Error::Config(format!(
                "max_delta_ms ({}) is below min_delta_us ({})",
                s.max_delta_ms, s.min_delta_us
            )));
        }
        Ok(())
    }
}
