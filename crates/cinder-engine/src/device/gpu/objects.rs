use std::ops::Range;

use crate::resource::{BufferUsage, PixelFormat, TextureFilter};

/// Byte ranges handed to `Queue::write_buffer` must be 4-byte aligned.
const COPY_ALIGN: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

pub(super) fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

/// Widens `start..end` outward to copy alignment, clamped to `len`.
pub(super) fn aligned_range(start: u64, end: u64, len: u64) -> Range<u64> {
    let start = start - start % COPY_ALIGN;
    let end = align_up(end, COPY_ALIGN).min(len);
    start..end
}

pub(super) struct GpuBuffer {
    pub buffer: wgpu::Buffer,
    /// CPU copy of the contents, padded to copy alignment. Unaligned writes
    /// are patched here and uploaded as a widened, aligned range.
    pub shadow: Vec<u8>,
}

impl GpuBuffer {
    pub fn usages(usage: BufferUsage) -> wgpu::BufferUsages {
        let bind = match usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index(_) => wgpu::BufferUsages::INDEX,
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
        };
        bind | wgpu::BufferUsages::COPY_DST
    }

    /// Patches the shadow copy and returns the aligned range to upload.
    pub fn patch(&mut self, offset: u64, data: &[u8]) -> Range<u64> {
        let start = offset as usize;
        self.shadow[start..start + data.len()].copy_from_slice(data);
        aligned_range(offset, offset + data.len() as u64, self.shadow.len() as u64)
    }
}

pub(super) struct GpuTexture {
    pub texture: wgpu::Texture,
    pub bind_group: wgpu::BindGroup,
    pub bytes_per_pixel: u32,
}

pub(super) fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
    }
}

pub(super) fn create_sampler(device: &wgpu::Device, filter: TextureFilter) -> wgpu::Sampler {
    let (label, mode) = match filter {
        TextureFilter::Nearest => ("cinder nearest sampler", wgpu::FilterMode::Nearest),
        TextureFilter::Linear => ("cinder linear sampler", wgpu::FilterMode::Linear),
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: mode,
        min_filter: mode,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    })
}

pub(super) fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("cinder depth"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: super::pipeline::DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
