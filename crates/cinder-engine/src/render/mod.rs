//! Renderer.
//!
//! Consumes per-drawable matrices and registry handles and turns them into
//! device calls, eliding state changes the device already has.

mod mesh;
mod renderer;
mod state;

pub use mesh::{Drawable, Material, Mesh, Vertex};
pub use renderer::{DrawError, FrameFence, FrameReport, FrameStats, Renderer};
pub use state::PipelineState;
