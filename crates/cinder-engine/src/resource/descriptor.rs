use bytemuck::Pod;

use crate::device::{DeviceError, DeviceErrorCode, IndexFormat};

use super::handle::ResourceKind;
use super::image::DecodedImage;

/// What a buffer is bound as.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index(IndexFormat),
    Uniform,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub usage: BufferUsage,
    /// Allocated size in bytes.
    pub size: u64,
    /// Initial contents, at most `size` bytes.
    pub contents: Option<Vec<u8>>,
}

impl BufferDescriptor {
    /// Vertex buffer initialized from `vertices`.
    pub fn vertices<T: Pod>(label: &str, vertices: &[T]) -> Self {
        Self::with_contents(label, BufferUsage::Vertex, bytemuck::cast_slice(vertices))
    }

    pub fn indices_u16(label: &str, indices: &[u16]) -> Self {
        Self::with_contents(
            label,
            BufferUsage::Index(IndexFormat::U16),
            bytemuck::cast_slice(indices),
        )
    }

    pub fn indices_u32(label: &str, indices: &[u32]) -> Self {
        Self::with_contents(
            label,
            BufferUsage::Index(IndexFormat::U32),
            bytemuck::cast_slice(indices),
        )
    }

    fn with_contents(label: &str, usage: BufferUsage, bytes: &[u8]) -> Self {
        Self {
            label: Some(label.to_owned()),
            usage,
            size: bytes.len() as u64,
            contents: Some(bytes.to_vec()),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum PixelFormat {
    #[default]
    Rgba8UnormSrgb,
    Rgba8Unorm,
    R8Unorm,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgba8UnormSrgb | PixelFormat::Rgba8Unorm => 4,
            PixelFormat::R8Unorm => 1,
        }
    }
}

/// Sampling filter for magnification and minification.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum TextureFilter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub filter: TextureFilter,
    /// Tightly packed rows, `width * height * bytes_per_pixel` bytes.
    pub pixels: Option<Vec<u8>>,
}

impl TextureDescriptor {
    /// Texture initialized from a decoded image.
    pub fn from_image(label: &str, image: DecodedImage) -> Self {
        Self {
            label: Some(label.to_owned()),
            width: image.width,
            height: image.height,
            format: image.format,
            filter: TextureFilter::default(),
            pixels: Some(image.pixels),
        }
    }

    pub fn bytes_per_row(&self) -> u64 {
        u64::from(self.width) * u64::from(self.format.bytes_per_pixel())
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes_per_row() * u64::from(self.height)
    }
}

/// A shader program: one WGSL module with a vertex and a fragment entry point.
///
/// Programs follow a fixed binding contract: group 0 binding 0 is the per-draw
/// `DrawConstants` uniform, group 1 bindings 0/1 are the material texture and
/// its sampler. Vertex input is `render::Vertex`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramDescriptor {
    pub label: Option<String>,
    pub source: String,
    pub vertex_entry: String,
    pub fragment_entry: String,
}

impl ProgramDescriptor {
    pub fn wgsl(label: &str, source: impl Into<String>) -> Self {
        Self {
            label: Some(label.to_owned()),
            source: source.into(),
            vertex_entry: "vs_main".to_owned(),
            fragment_entry: "fs_main".to_owned(),
        }
    }
}

/// Tagged descriptor over every resource kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDescriptor {
    Buffer(BufferDescriptor),
    Texture(TextureDescriptor),
    Program(ProgramDescriptor),
}

impl ResourceDescriptor {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDescriptor::Buffer(_) => ResourceKind::Buffer,
            ResourceDescriptor::Texture(_) => ResourceKind::Texture,
            ResourceDescriptor::Program(_) => ResourceKind::Program,
        }
    }

    /// Bytes addressable by `update`.
    pub fn extent(&self) -> u64 {
        match self {
            ResourceDescriptor::Buffer(b) => b.size,
            ResourceDescriptor::Texture(t) => t.byte_len(),
            ResourceDescriptor::Program(_) => 0,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            ResourceDescriptor::Buffer(b) => b.label.as_deref(),
            ResourceDescriptor::Texture(t) => t.label.as_deref(),
            ResourceDescriptor::Program(p) => p.label.as_deref(),
        }
    }

    /// Rejects descriptors no device could honour.
    pub(crate) fn validate(&self) -> Result<(), DeviceError> {
        let invalid = |msg: String| Err(DeviceError::new(DeviceErrorCode::InvalidDescriptor, msg));

        match self {
            ResourceDescriptor::Buffer(b) => {
                if b.size == 0 {
                    return invalid("buffer size is zero".into());
                }
                if let Some(contents) = &b.contents {
                    if contents.len() as u64 > b.size {
                        return invalid(format!(
                            "initial contents ({} bytes) exceed buffer size ({} bytes)",
                            contents.len(),
                            b.size
                        ));
                    }
                }
                if let BufferUsage::Index(format) = b.usage {
                    if b.size % format.size() != 0 {
                        return invalid(format!(
                            "index buffer size {} is not a multiple of {}",
                            b.size,
                            format.size()
                        ));
                    }
                }
            }
            ResourceDescriptor::Texture(t) => {
                if t.width == 0 || t.height == 0 {
                    return invalid(format!("texture size {}x{} is empty", t.width, t.height));
                }
                if let Some(pixels) = &t.pixels {
                    if pixels.len() as u64 != t.byte_len() {
                        return invalid(format!(
                            "pixel data is {} bytes, expected {}",
                            pixels.len(),
                            t.byte_len()
                        ));
                    }
                }
            }
            ResourceDescriptor::Program(p) => {
                if p.source.trim().is_empty() {
                    return invalid("program source is empty".into());
                }
                if p.vertex_entry.is_empty() || p.fragment_entry.is_empty() {
                    return invalid("program entry point is empty".into());
                }
            }
        }
        Ok(())
    }
}

impl From<BufferDescriptor> for ResourceDescriptor {
    fn from(d: BufferDescriptor) -> Self {
        ResourceDescriptor::Buffer(d)
    }
}

impl From<TextureDescriptor> for ResourceDescriptor {
    fn from(d: TextureDescriptor) -> Self {
        ResourceDescriptor::Texture(d)
    }
}

impl From<ProgramDescriptor> for ResourceDescriptor {
    fn from(d: ProgramDescriptor) -> Self {
        ResourceDescriptor::Program(d)
    }
}
