//! Transform pipeline.
//!
//! Coordinate convention, shared with the renderer and the shaders:
//! right-handed, Y up, the camera looks down -Z, clip-space depth in `[0, 1]`,
//! counter-clockwise front faces. Matrices are column-major `glam` types.

mod camera;
mod local;
mod pipeline;

pub use camera::{Camera, Projection};
pub use local::Transform;
pub use pipeline::{compute_matrices, DrawMatrices, TransformPipeline};
