use std::fmt;

use glam::Mat4;

use crate::device::{
    ClearColor, DeviceError, DeviceObject, DrawConstants, FrameAcquire, GraphicsDevice,
    ObjectName,
};
use crate::error::{Error, Result};
use crate::resource::{BufferUsage, ResourceHandle, ResourceKind, ResourceRegistry};
use crate::transform::DrawMatrices;

use super::mesh::Drawable;
use super::state::PipelineState;

/// Marker signalled by the device once a submitted frame has been consumed.
///
/// Fence values start at 1 and increase by one per `end_frame`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameFence(u64);

impl FrameFence {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameFence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fence {}", self.0)
    }
}

/// Per-frame counters.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FrameStats {
    /// Draws issued to the device.
    pub draws: u32,
    /// Draws dropped because a handle did not resolve.
    pub skipped: u32,
    /// Bind/state calls forwarded to the device.
    pub state_changes: u32,
    /// Bind/state requests that matched the tracked state.
    pub state_changes_elided: u32,
}

/// A draw that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawError {
    /// Position of the draw within the frame.
    pub index: u32,
    pub error: Error,
}

/// Outcome of one recorded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub fence: FrameFence,
    pub stats: FrameStats,
    pub errors: Vec<DrawError>,
    /// `false` when the device had no target for this frame (surface being
    /// reconfigured); the frame was fenced but nothing was drawn.
    pub target_acquired: bool,
}

#[derive(Debug)]
struct Recording {
    fence: u64,
    acquire: FrameAcquire,
    stats: FrameStats,
    errors: Vec<DrawError>,
    next_index: u32,
}

/// Issues draws in submission order and owns the pipeline-state mirror.
#[derive(Debug)]
pub struct Renderer {
    state: PipelineState,
    next_fence: u64,
    recording: Option<Recording>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            state: PipelineState::default(),
            next_fence: 1,
            recording: None,
        }
    }

    /// Acquires the frame target, clears it and resets per-frame bookkeeping.
    pub fn begin_frame<D: GraphicsDevice>(
        &mut self,
        registry: &mut ResourceRegistry<D>,
        clear: ClearColor,
    ) -> Result<()> {
        if self.recording.is_some() {
            log::warn!("begin_frame while a frame is recording; continuing the open frame");
            return Ok(());
        }
        registry.context().ensure_alive()?;

        let acquire = match registry.device_mut().begin_frame(clear) {
            Ok(acquire) => acquire,
            Err(e) if e.code.is_fatal() => return Err(lost(registry, e)),
            Err(e) => {
                log::warn!("frame target unavailable, skipping: {e}");
                FrameAcquire::Skip
            }
        };

        // A new frame starts with nothing bound.
        self.state.reset();
        self.recording = Some(Recording {
            fence: self.next_fence,
            acquire,
            stats: FrameStats::default(),
            errors: Vec::new(),
            next_index: 0,
        });
        Ok(())
    }

    /// Binds the drawable's resources and issues one indexed draw.
    ///
    /// A handle that does not resolve fails this draw with `StaleHandle` or
    /// `NotFound`, and a buffer in the wrong slot (or with the wrong index
    /// format) with `WrongBufferUsage`. The error is returned and also collected
    /// into the frame report. The frame itself goes on.
    pub fn draw<D: GraphicsDevice>(
        &mut self,
        registry: &mut ResourceRegistry<D>,
        drawable: &Drawable,
        matrices: &DrawMatrices,
    ) -> Result<()> {
        let Some(rec) = self.recording.as_mut() else {
            return Err(Error::FrameNotRecording);
        };
        let index = rec.next_index;
        rec.next_index += 1;

        let resolved = match resolve_all(registry, drawable) {
            Ok(resolved) => resolved,
            Err(error) => {
                if !error.is_fatal() {
                    log::warn!("draw {index} skipped: {error}");
                    rec.stats.skipped += 1;
                    rec.errors.push(DrawError {
                        index,
                        error: error.clone(),
                    });
                }
                return Err(error);
            }
        };

        let fence = rec.fence;
        for handle in drawable_handles(drawable) {
            registry.mark_in_flight(handle, fence);
        }

        if rec.acquire == FrameAcquire::Skip {
            return Ok(());
        }

        let material = &drawable.material;
        let mesh = &drawable.mesh;
        let device = registry.device_mut();
        let state = &mut self.state;

        let issued = [
            state.bind_program(device, resolved.program),
            state.set_blend(device, material.blend),
            state.set_depth(device, material.depth),
            state.set_cull(device, material.cull),
            state.bind_vertex_buffer(device, resolved.vertices),
            state.bind_index_buffer(device, resolved.indices, mesh.index_format),
            state.bind_texture(device, resolved.texture),
        ];
        let changes = issued.iter().filter(|issued| **issued).count() as u32;
        rec.stats.state_changes += changes;
        rec.stats.state_changes_elided += issued.len() as u32 - changes;

        device.draw_indexed(&draw_constants(matrices, material.tint), mesh.index_count);
        rec.stats.draws += 1;
        Ok(())
    }

    /// Submits the recorded frame and returns its fence.
    pub fn end_frame<D: GraphicsDevice>(
        &mut self,
        registry: &mut ResourceRegistry<D>,
    ) -> Result<FrameReport> {
        let rec = self.recording.take().ok_or(Error::FrameNotRecording)?;

        if let Err(e) = registry.device_mut().submit(rec.fence) {
            return Err(lost(registry, e));
        }
        self.next_fence = rec.fence + 1;

        if !rec.errors.is_empty() {
            log::debug!(
                "frame {} finished with {} skipped draw(s)",
                rec.fence,
                rec.errors.len()
            );
        }

        Ok(FrameReport {
            fence: FrameFence(rec.fence),
            stats: rec.stats,
            errors: rec.errors,
            target_acquired: rec.acquire == FrameAcquire::Ready,
        })
    }
}

struct Resolved {
    program: ObjectName,
    vertices: ObjectName,
    indices: ObjectName,
    texture: Option<ObjectName>,
}

fn resolve_all<D: GraphicsDevice>(
    registry: &ResourceRegistry<D>,
    drawable: &Drawable,
) -> Result<Resolved> {
    let resolve = |handle: ResourceHandle, kind: ResourceKind| -> Result<DeviceObject> {
        let object = registry.resolve(handle)?;
        if object.kind != kind {
            log::warn!("{handle} used where a {kind} is expected");
            return Err(Error::NotFound(handle));
        }
        Ok(object)
    };
    let buffer = |handle: ResourceHandle, expected: BufferUsage| -> Result<ObjectName> {
        let object = resolve(handle, ResourceKind::Buffer)?;
        match object.usage {
            Some(actual) if actual == expected => Ok(object.name),
            Some(actual) => Err(Error::WrongBufferUsage {
                handle,
                expected,
                actual,
            }),
            None => Err(Error::NotFound(handle)),
        }
    };

    let mesh = &drawable.mesh;
    Ok(Resolved {
        program: resolve(drawable.material.program, ResourceKind::Program)?.name,
        vertices: buffer(mesh.vertices, BufferUsage::Vertex)?,
        indices: buffer(mesh.indices, BufferUsage::Index(mesh.index_format))?,
        texture: drawable
            .material
            .texture
            .map(|t| resolve(t, ResourceKind::Texture).map(|o| o.name))
            .transpose()?,
    })
}

fn drawable_handles(drawable: &Drawable) -> impl Iterator<Item = ResourceHandle> {
    [
        Some(drawable.material.program),
        Some(drawable.mesh.vertices),
        Some(drawable.mesh.indices),
        drawable.material.texture,
    ]
    .into_iter()
    .flatten()
}

fn draw_constants(m: &DrawMatrices, tint: [f32; 4]) -> DrawConstants {
    DrawConstants {
        mvp: m.mvp().to_cols_array_2d(),
        model: m.model.to_cols_array_2d(),
        normal: Mat4::from_mat3(m.normal).to_cols_array_2d(),
        tint,
    }
}

fn lost<D: GraphicsDevice>(registry: &ResourceRegistry<D>, e: DeviceError) -> Error {
    registry.context().mark_lost();
    Error::DeviceLost(e.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{test_lock, Context};
    use crate::device::headless::{DeviceCall, HeadlessDevice, HeadlessProbe};
    use crate::device::{DeviceErrorCode, IndexFormat};
    use crate::render::{Material, Mesh, Vertex};
    use crate::resource::{BufferDescriptor, ProgramDescriptor, TextureDescriptor};
    use crate::resource::image::DecodedImage;
    use crate::transform::{compute_matrices, Camera, Transform};

    const SHADER: &str = "@vertex fn vs_main() {} @fragment fn fs_main() {}";

    struct Fixture {
        registry: ResourceRegistry<HeadlessDevice>,
        probe: HeadlessProbe,
        drawable: Drawable,
    }

    fn fixture() -> Fixture {
        let device = HeadlessDevice::new();
        let probe = device.probe();
        let mut registry = ResourceRegistry::new(&Context::acquire().unwrap(), device);

        let vertices = [Vertex {
            position: [0.0; 3],
            normal: [0.0, 1.0, 0.0],
            uv: [0.0; 2],
        }; 3];
        let vb = registry.create(BufferDescriptor::vertices("tri", &vertices)).unwrap();
        let ib = registry.create(BufferDescriptor::indices_u16("tri", &[0, 1, 2])).unwrap();
        let program = registry.create(ProgramDescriptor::wgsl("flat", SHADER)).unwrap();
        let image = DecodedImage::checkerboard(64, 8, [255; 4], [0, 0, 0, 255]);
        let texture = registry
            .create(TextureDescriptor::from_image("checker", image))
            .unwrap();

        let drawable = Drawable {
            mesh: Mesh::indexed(vb, ib, 3),
            material: Material::new(program).with_texture(texture),
            transform: Transform::IDENTITY,
        };
        probe.clear_calls();
        Fixture {
            registry,
            probe,
            drawable,
        }
    }

    fn matrices(d: &Drawable) -> DrawMatrices {
        compute_matrices(&Camera::default(), d)
    }

    #[test]
    fn identical_consecutive_draws_issue_no_binds() {
        let _guard = test_lock();
        let mut f = fixture();
        let mut renderer = Renderer::new();
        let m = matrices(&f.drawable);

        renderer.begin_frame(&mut f.registry, ClearColor::BLACK).unwrap();
        renderer.draw(&mut f.registry, &f.drawable, &m).unwrap();
        let before_second = f.probe.calls().len();
        renderer.draw(&mut f.registry, &f.drawable, &m).unwrap();
        let report = renderer.end_frame(&mut f.registry).unwrap();

        let second: Vec<_> = f.probe.calls()[before_second..].to_vec();
        assert!(matches!(second[0], DeviceCall::Draw { index_count: 3, .. }));
        assert!(second.iter().all(|c| !c.is_state_change()));
        assert_eq!(report.stats.draws, 2);
        assert_eq!(report.stats.state_changes, 7);
        assert_eq!(report.stats.state_changes_elided, 7);
    }

    #[test]
    fn stale_texture_skips_only_that_draw() {
        let _guard = test_lock();
        let mut f = fixture();
        let mut renderer = Renderer::new();
        let texture = f.drawable.material.texture.unwrap();
        let untextured = Drawable {
            material: Material::new(f.drawable.material.program),
            ..f.drawable
        };

        renderer.begin_frame(&mut f.registry, ClearColor::BLACK).unwrap();
        f.registry.destroy(texture);
        let err = renderer
            .draw(&mut f.registry, &f.drawable, &matrices(&f.drawable))
            .unwrap_err();
        assert_eq!(err, Error::StaleHandle(texture));
        renderer
            .draw(&mut f.registry, &untextured, &matrices(&untextured))
            .unwrap();
        let report = renderer.end_frame(&mut f.registry).unwrap();

        assert_eq!(report.stats.draws, 1);
        assert_eq!(report.stats.skipped, 1);
        assert_eq!(
            report.errors,
            vec![DrawError {
                index: 0,
                error: Error::StaleHandle(texture)
            }]
        );
        assert!(f.probe.calls().contains(&DeviceCall::BindTexture(None)));
    }

    #[test]
    fn wide_indices_bind_with_their_format() {
        let _guard = test_lock();
        let mut f = fixture();
        let mut renderer = Renderer::new();
        let ib = f
            .registry
            .create(BufferDescriptor::indices_u32("wide", &[0, 1, 2]))
            .unwrap();
        let wide = Drawable {
            mesh: Mesh::indexed(f.drawable.mesh.vertices, ib, 3)
                .with_index_format(IndexFormat::U32),
            ..f.drawable
        };

        renderer.begin_frame(&mut f.registry, ClearColor::BLACK).unwrap();
        renderer.draw(&mut f.registry, &wide, &matrices(&wide)).unwrap();
        renderer.end_frame(&mut f.registry).unwrap();

        assert!(f
            .probe
            .calls()
            .iter()
            .any(|c| matches!(c, DeviceCall::BindIndexBuffer(_, IndexFormat::U32))));
    }

    #[test]
    fn buffer_in_the_wrong_slot_skips_only_that_draw() {
        let _guard = test_lock();
        let mut f = fixture();
        let mut renderer = Renderer::new();
        let ib = f.drawable.mesh.indices;
        let swapped = Drawable {
            mesh: Mesh::indexed(ib, ib, 3),
            ..f.drawable
        };
        let narrow_as_wide = Drawable {
            mesh: f.drawable.mesh.with_index_format(IndexFormat::U32),
            ..f.drawable
        };

        renderer.begin_frame(&mut f.registry, ClearColor::BLACK).unwrap();
        let err = renderer
            .draw(&mut f.registry, &swapped, &matrices(&swapped))
            .unwrap_err();
        assert_eq!(
            err,
            Error::WrongBufferUsage {
                handle: ib,
                expected: BufferUsage::Vertex,
                actual: BufferUsage::Index(IndexFormat::U16),
            }
        );
        assert!(matches!(
            renderer.draw(&mut f.registry, &narrow_as_wide, &matrices(&narrow_as_wide)),
            Err(Error::WrongBufferUsage { .. })
        ));
        renderer
            .draw(&mut f.registry, &f.drawable, &matrices(&f.drawable))
            .unwrap();
        let report = renderer.end_frame(&mut f.registry).unwrap();

        assert_eq!(report.stats.draws, 1);
        assert_eq!(report.stats.skipped, 2);
        assert_eq!(report.errors.len(), 2);
        let vertex_binds = f
            .probe
            .calls()
            .into_iter()
            .filter(|c| matches!(c, DeviceCall::BindVertexBuffer(_)))
            .count();
        assert_eq!(vertex_binds, 1);
    }

    #[test]
    fn fences_count_up_from_one() {
        let _guard = test_lock();
        let mut f = fixture();
        let mut renderer = Renderer::new();
        let fences: Vec<u64> = (0..3)
            .map(|_| {
                renderer.begin_frame(&mut f.registry, ClearColor::BLACK).unwrap();
                renderer.end_frame(&mut f.registry).unwrap().fence.value()
            })
            .collect();
        assert_eq!(fences, vec![1, 2, 3]);
    }

    #[test]
    fn draw_outside_frame_is_rejected() {
        let _guard = test_lock();
        let mut f = fixture();
        let mut renderer = Renderer::new();
        let m = matrices(&f.drawable);
        assert_eq!(
            renderer.draw(&mut f.registry, &f.drawable, &m).unwrap_err(),
            Error::FrameNotRecording
        );
        assert_eq!(
            renderer.end_frame(&mut f.registry).unwrap_err(),
            Error::FrameNotRecording
        );
    }

    #[test]
    fn skipped_target_still_fences_and_defers_destruction() {
        let _guard = test_lock();
        let mut f = fixture();
        f.probe.set_fence_lag(1);
        let mut renderer = Renderer::new();
        f.probe.fail_next_acquire(DeviceErrorCode::SurfaceLost);

        renderer.begin_frame(&mut f.registry, ClearColor::BLACK).unwrap();
        renderer
            .draw(&mut f.registry, &f.drawable, &matrices(&f.drawable))
            .unwrap();
        let report = renderer.end_frame(&mut f.registry).unwrap();

        assert!(!report.target_acquired);
        assert_eq!(report.stats.draws, 0);
        assert!(!f.probe.calls().iter().any(|c| matches!(c, DeviceCall::Draw { .. })));

        // The texture was referenced by fence 1, which has not completed.
        f.registry.destroy(f.drawable.material.texture.unwrap());
        assert_eq!(f.registry.stats().pending_destruction, 1);
    }

    #[test]
    fn device_loss_on_submit_is_fatal() {
        let _guard = test_lock();
        let mut f = fixture();
        let mut renderer = Renderer::new();
        renderer.begin_frame(&mut f.registry, ClearColor::BLACK).unwrap();
        f.probe.lose_device();

        let err = renderer.end_frame(&mut f.registry).unwrap_err();
        assert!(err.is_fatal());
        assert!(f.registry.context().is_lost());
        assert!(renderer.begin_frame(&mut f.registry, ClearColor::BLACK).is_err());
    }
}
