//! Graphics device seam.
//!
//! The resource registry and the renderer are the only callers of
//! `GraphicsDevice`. Device objects are addressed by opaque `ObjectName`s, the
//! way a native API hands out object names; the registry maps its stable
//! handles onto them.
//!
//! Backends:
//! - `gpu`: the wgpu device, bound to a winit window surface
//! - `headless`: an in-memory device that records every call

pub mod headless;
mod state;
pub mod gpu;

use std::fmt;
use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::resource::{
    BufferDescriptor, BufferUsage, ProgramDescriptor, ResourceKind, TextureDescriptor,
};

pub use state::{BlendMode, ClearColor, CullMode, DepthState, IndexFormat};

/// Device-native object name.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ObjectName(NonZeroU64);

impl ObjectName {
    #[inline]
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to a live device object, as stored by the resource registry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DeviceObject {
    pub kind: ResourceKind,
    pub name: ObjectName,
    /// Allocated size in bytes (0 for programs).
    pub extent: u64,
    /// What a buffer was created to be bound as; `None` for other kinds.
    pub usage: Option<BufferUsage>,
}

/// Why the device refused an operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DeviceErrorCode {
    InvalidDescriptor,
    UnsupportedFormat,
    OutOfMemory,
    ShaderCompilation,
    SurfaceLost,
    SurfaceTimeout,
    DeviceLost,
    Other,
}

impl DeviceErrorCode {
    /// Whether the device can no longer be used at all.
    pub fn is_fatal(self) -> bool {
        matches!(self, DeviceErrorCode::DeviceLost | DeviceErrorCode::OutOfMemory)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("{code:?}: {message}")]
pub struct DeviceError {
    pub code: DeviceErrorCode,
    pub message: String,
}

impl DeviceError {
    pub fn new(code: DeviceErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Outcome of acquiring the next frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameAcquire {
    /// A target is available; bind/draw calls are recorded into it.
    Ready,
    /// The target is temporarily unavailable (reconfigured surface, timeout).
    /// The frame is still submitted and fenced, but nothing is drawn.
    Skip,
}

/// Rows of a 2D texture addressed by a texture write.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TextureRegion {
    pub first_row: u32,
    pub rows: u32,
    pub bytes_per_row: u32,
}

/// Per-draw uniform block.
///
/// Matrices are column-major, matching WGSL `mat4x4<f32>`. The normal matrix is
/// padded to a 4x4 so the block has no implicit padding.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct DrawConstants {
    pub mvp: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
    pub tint: [f32; 4],
}

const _: () = assert!(std::mem::size_of::<DrawConstants>() == 208);

/// Graphics API binding consumed by the core.
///
/// All calls happen on the thread that owns the frame loop.
pub trait GraphicsDevice {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> Result<ObjectName, DeviceError>;
    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<ObjectName, DeviceError>;
    fn create_program(&mut self, desc: &ProgramDescriptor) -> Result<ObjectName, DeviceError>;

    /// Releases a device object. The caller guarantees no submitted frame still
    /// references it.
    fn destroy_object(&mut self, object: DeviceObject);

    fn write_buffer(&mut self, buffer: ObjectName, offset: u64, data: &[u8])
    -> Result<(), DeviceError>;
    fn write_texture(
        &mut self,
        texture: ObjectName,
        region: TextureRegion,
        data: &[u8],
    ) -> Result<(), DeviceError>;

    /// Resizes the presentation target (physical pixels).
    fn resize(&mut self, width: u32, height: u32);

    /// Acquires the next frame target and clears it.
    fn begin_frame(&mut self, clear: ClearColor) -> Result<FrameAcquire, DeviceError>;

    fn bind_program(&mut self, program: ObjectName);
    fn bind_vertex_buffer(&mut self, buffer: ObjectName);
    fn bind_index_buffer(&mut self, buffer: ObjectName, format: IndexFormat);
    /// `None` binds the device's default (opaque white) texture.
    fn bind_texture(&mut self, texture: Option<ObjectName>);
    fn set_blend(&mut self, blend: BlendMode);
    fn set_depth(&mut self, depth: DepthState);
    fn set_cull(&mut self, cull: CullMode);

    fn draw_indexed(&mut self, constants: &DrawConstants, index_count: u32);

    /// Submits everything recorded since `begin_frame`; `fence` is signalled
    /// once the device has consumed the submission. Fence values increase.
    fn submit(&mut self, fence: u64) -> Result<(), DeviceError>;

    /// Highest fence value known to be complete.
    fn completed_fence(&mut self) -> u64;

    /// Blocks until all submitted work is complete.
    fn wait_idle(&mut self);
}
