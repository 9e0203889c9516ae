use std::num::NonZeroUsize;

use glam::{Mat3, Mat4};

use crate::render::Drawable;

use super::camera::{Camera, Projection};

/// Matrices for one drawable in one frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DrawMatrices {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    /// Inverse-transpose of the model's upper 3x3, for transforming normals.
    pub normal: Mat3,
}

impl DrawMatrices {
    pub fn mvp(&self) -> Mat4 {
        self.projection * self.view * self.model
    }
}

/// Computes the matrices for `drawable` seen through `camera`.
///
/// Pure: reads only its inputs, so calls may run on any thread.
pub fn compute_matrices(camera: &Camera, drawable: &Drawable) -> DrawMatrices {
    matrices_for(camera.view(), camera.projection.matrix(), drawable)
}

fn matrices_for(view: Mat4, projection: Mat4, drawable: &Drawable) -> DrawMatrices {
    let model = drawable.transform.matrix();
    DrawMatrices {
        model,
        view,
        projection,
        normal: normal_matrix(model),
    }
}

fn normal_matrix(model: Mat4) -> Mat3 {
    let m = Mat3::from_mat4(model);
    if m.determinant().abs() <= f32::EPSILON {
        // Degenerate scale: normals are meaningless, keep the linear part.
        return m;
    }
    m.inverse().transpose()
}

/// Per-frame matrix computation with a cached projection.
///
/// The projection is only rebuilt when the camera's projection parameters
/// (including aspect ratio) change. Large batches are split across scoped
/// worker threads; results come back in input order.
#[derive(Debug)]
pub struct TransformPipeline {
    cached: Option<(Projection, Mat4)>,
    projection_builds: u64,
    parallel_threshold: usize,
    workers: usize,
}

impl TransformPipeline {
    pub fn new(parallel_threshold: usize) -> Self {
        let workers = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            cached: None,
            projection_builds: 0,
            parallel_threshold,
            workers,
        }
    }

    /// Projection matrix for `projection`, rebuilt only on change.
    pub fn projection(&mut self, projection: &Projection) -> Mat4 {
        match &self.cached {
            Some((params, matrix)) if params == projection => *matrix,
            _ => {
                let matrix = projection.matrix();
                self.cached = Some((*projection, matrix));
                self.projection_builds += 1;
                log::trace!("projection rebuilt (aspect {:.3})", projection.aspect);
                matrix
            }
        }
    }

    /// How many times the projection has been rebuilt.
    pub fn projection_builds(&self) -> u64 {
        self.projection_builds
    }

    /// Computes matrices for every drawable, in order.
    pub fn compute_batch(&mut self, camera: &Camera, drawables: &[Drawable]) -> Vec<DrawMatrices> {
        let projection = self.projection(&camera.projection);
        let view = camera.view();

        if drawables.len() <= self.parallel_threshold || self.workers < 2 {
            return drawables
                .iter()
                .map(|d| matrices_for(view, projection, d))
                .collect();
        }

        let chunk = drawables.len().div_ceil(self.workers);
        let mut out = Vec::with_capacity(drawables.len());
        std::thread::scope(|scope| {
            let handles: Vec<_> = drawables
                .chunks(chunk)
                .map(|part| {
                    scope.spawn(move || {
                        part.iter()
                            .map(|d| matrices_for(view, projection, d))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(part) => out.extend(part),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
        });
        out
    }
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new(256)
    }
}
