use bytemuck::{Pod, Zeroable};

use crate::device::{BlendMode, CullMode, DepthState, IndexFormat};
use crate::resource::ResourceHandle;
use crate::transform::Transform;

/// Vertex layout every program receives at locations 0..=2.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

const _: () = assert!(std::mem::size_of::<Vertex>() == 32);

/// Indexed triangle list living in registry buffers.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Mesh {
    pub vertices: ResourceHandle,
    pub indices: ResourceHandle,
    pub index_count: u32,
    pub index_format: IndexFormat,
}

impl Mesh {
    /// Mesh with 16-bit indices.
    pub fn indexed(vertices: ResourceHandle, indices: ResourceHandle, index_count: u32) -> Self {
        Self {
            vertices,
            indices,
            index_count,
            index_format: IndexFormat::U16,
        }
    }

    pub fn with_index_format(mut self, format: IndexFormat) -> Self {
        self.index_format = format;
        self
    }
}

/// Program plus the fixed-function state it is drawn with.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Material {
    pub program: ResourceHandle,
    /// `None` samples the device's opaque white texture.
    pub texture: Option<ResourceHandle>,
    pub blend: BlendMode,
    pub depth: DepthState,
    pub cull: CullMode,
    /// Linear RGBA multiplied into the sampled color.
    pub tint: [f32; 4],
}

impl Material {
    /// Opaque, depth-tested, back-face culled, untextured.
    pub fn new(program: ResourceHandle) -> Self {
        Self {
            program,
            texture: None,
            blend: BlendMode::Opaque,
            depth: DepthState::default(),
            cull: CullMode::Back,
            tint: [1.0; 4],
        }
    }

    pub fn with_texture(mut self, texture: ResourceHandle) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_depth(mut self, depth: DepthState) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_cull(mut self, cull: CullMode) -> Self {
        self.cull = cull;
        self
    }

    pub fn with_tint(mut self, tint: [f32; 4]) -> Self {
        self.tint = tint;
        self
    }
}

/// One renderable unit. Owned by the caller and handed to the core each frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Drawable {
    pub mesh: Mesh,
    pub material: Material,
    pub transform: Transform,
}
