//! wgpu device bound to a winit window surface.
//!
//! Bind and draw calls are recorded while a frame is open and encoded into a
//! single render pass at `submit`. Pipelines are built lazily, one per
//! (program, blend, depth, cull) combination, and cached until the program is
//! destroyed. Per-draw constants go through one dynamic-offset uniform buffer.

mod init;
mod objects;
mod pipeline;
mod surface;

pub use init::GpuInit;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::device::{
    BlendMode, ClearColor, CullMode, DepthState, DeviceError, DeviceErrorCode, DeviceObject,
    DrawConstants, FrameAcquire, GraphicsDevice, IndexFormat, ObjectName, TextureRegion,
};
use crate::error::{Error, Result};
use crate::platform::winit::{PresentSlot, WinitWindow};
use crate::resource::{
    BufferDescriptor, PixelFormat, ProgramDescriptor, ResourceKind, TextureDescriptor,
    TextureFilter,
};

use objects::{align_up, GpuBuffer, GpuTexture};
use pipeline::{GpuProgram, Layouts, PipelineKey};
use surface::SurfaceErrorAction;

/// Upper bound on how long `wait_idle` polls before giving up.
const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// wgpu implementation of `GraphicsDevice`.
pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: (u32, u32),
    depth: wgpu::TextureView,

    layouts: Layouts,
    nearest: wgpu::Sampler,
    linear: wgpu::Sampler,
    white: GpuTexture,
    uniforms: UniformRing,

    buffers: HashMap<ObjectName, GpuBuffer>,
    textures: HashMap<ObjectName, GpuTexture>,
    programs: HashMap<ObjectName, GpuProgram>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    next_name: u64,

    bound: Bound,
    frame: Option<Frame>,

    submitted: u64,
    completed: Arc<AtomicU64>,
    lost: Arc<AtomicBool>,
    present: PresentSlot,
}

/// State set by bind calls, captured into each recorded draw.
#[derive(Debug, Default, Copy, Clone)]
struct Bound {
    program: Option<ObjectName>,
    vertex: Option<ObjectName>,
    index: Option<(ObjectName, IndexFormat)>,
    texture: Option<ObjectName>,
    blend: BlendMode,
    depth: DepthState,
    cull: CullMode,
}

#[derive(Debug, Copy, Clone)]
struct DrawCall {
    key: PipelineKey,
    vertex: ObjectName,
    index: (ObjectName, IndexFormat),
    texture: Option<ObjectName>,
    index_count: u32,
}

struct Frame {
    target: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,
    clear: ClearColor,
    draws: Vec<DrawCall>,
    constants: Vec<DrawConstants>,
}

/// Dynamic-offset uniform buffer holding one `DrawConstants` block per draw.
struct UniformRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    /// Distance between blocks, rounded to the device's offset alignment.
    stride: u64,
    capacity: usize,
    staging: Vec<u8>,
}

impl UniformRing {
    const MIN_CAPACITY: usize = 64;

    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, stride: u64, capacity: usize) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cinder draw constants"),
            size: stride * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cinder draw constants bind group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<DrawConstants>() as u64),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            stride,
            capacity,
            staging: Vec::new(),
        }
    }

    fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        constants: &[DrawConstants],
    ) {
        if constants.is_empty() {
            return;
        }
        if constants.len() > self.capacity {
            let capacity = constants.len().next_power_of_two().max(Self::MIN_CAPACITY);
            log::debug!("growing draw constant buffer to {capacity} blocks");
            *self = Self::new(device, layout, self.stride, capacity);
        }

        let stride = self.stride as usize;
        self.staging.clear();
        self.staging.resize(stride * constants.len(), 0);
        for (i, c) in constants.iter().enumerate() {
            let bytes = bytemuck::bytes_of(c);
            self.staging[i * stride..i * stride + bytes.len()].copy_from_slice(bytes);
        }
        queue.write_buffer(&self.buffer, 0, &self.staging);
    }

    fn offset(&self, draw: usize) -> u32 {
        (draw as u64 * self.stride) as u32
    }
}

fn lost() -> DeviceError {
    DeviceError::new(DeviceErrorCode::DeviceLost, "the wgpu device was lost")
}

fn index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::U16 => wgpu::IndexFormat::Uint16,
        IndexFormat::U32 => wgpu::IndexFormat::Uint32,
    }
}

impl WgpuDevice {
    /// Creates the device and configures a surface on `window`.
    ///
    /// Adapter and device acquisition is asynchronous under wgpu; this blocks on
    /// it. Fails with `Error::Platform` when no suitable adapter exists.
    pub fn new(window: &WinitWindow, init: GpuInit) -> Result<Self> {
        let handle = window
            .window()
            .ok_or_else(|| Error::Platform("the window has been released".into()))?;
        pollster::block_on(Self::create(handle, window.present_slot(), init))
    }

    async fn create(window: Arc<Window>, present: PresentSlot, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();

        let GpuInit {
            prefer_srgb,
            present_mode,
            alpha_mode,
            required_features,
            required_limits,
            desired_maximum_frame_latency,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| Error::Platform(format!("failed to create wgpu surface: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::Platform(format!("failed to find a suitable GPU adapter: {e}")))?;

        let info = adapter.get_info();
        log::info!("using {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("cinder device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| Error::Platform(format!("failed to create wgpu device/queue: {e}")))?;

        let lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("device lost ({reason:?}): {message}");
            lost_flag.store(true, Ordering::Release);
        });

        let caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&caps, prefer_srgb)
            .ok_or_else(|| Error::Platform("no supported surface formats".into()))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface::choose_present_mode(&caps, present_mode),
            alpha_mode: surface::choose_alpha_mode(&caps, alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency,
        };
        if size.width > 0 && size.height > 0 {
            surface.configure(&device, &config);
        }
        log::debug!(
            "surface configured: {:?} {}x{} {:?}",
            config.format,
            config.width,
            config.height,
            config.present_mode
        );

        let layouts = Layouts::new(&device);
        let nearest = objects::create_sampler(&device, TextureFilter::Nearest);
        let linear = objects::create_sampler(&device, TextureFilter::Linear);

        let stride = align_up(
            std::mem::size_of::<DrawConstants>() as u64,
            u64::from(device.limits().min_uniform_buffer_offset_alignment),
        );
        let uniforms = UniformRing::new(&device, &layouts.draw, stride, UniformRing::MIN_CAPACITY);
        let depth = objects::create_depth_view(&device, config.width, config.height);

        let white = upload_texture(
            &device,
            &queue,
            &layouts.material,
            &nearest,
            "cinder white",
            (1, 1),
            PixelFormat::Rgba8Unorm,
            Some(&[0xff; 4]),
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size: (size.width, size.height),
            depth,
            layouts,
            nearest,
            linear,
            white,
            uniforms,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            next_name: 1,
            bound: Bound::default(),
            frame: None,
            submitted: 0,
            completed: Arc::new(AtomicU64::new(0)),
            lost,
            present,
        })
    }

    /// Returns the active surface format.
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn check_alive(&self) -> std::result::Result<(), DeviceError> {
        if self.lost.load(Ordering::Acquire) {
            return Err(lost());
        }
        Ok(())
    }

    fn allocate_name(&mut self) -> std::result::Result<ObjectName, DeviceError> {
        let name = ObjectName::new(self.next_name)
            .ok_or_else(|| DeviceError::new(DeviceErrorCode::Other, "object names exhausted"))?;
        self.next_name += 1;
        Ok(name)
    }

    fn sampler(&self, filter: TextureFilter) -> &wgpu::Sampler {
        match filter {
            TextureFilter::Nearest => &self.nearest,
            TextureFilter::Linear => &self.linear,
        }
    }

    fn reconfigure(&mut self) {
        if self.size.0 > 0 && self.size.1 > 0 {
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Builds missing pipelines and uploads the frame's draw constants.
    fn prepare(&mut self, draws: &[DrawCall], constants: &[DrawConstants]) {
        for draw in draws {
            if self.pipelines.contains_key(&draw.key) {
                continue;
            }
            if let Some(program) = self.programs.get(&draw.key.program) {
                let pipeline = pipeline::create_pipeline(
                    &self.device,
                    &self.layouts,
                    program,
                    draw.key,
                    self.config.format,
                );
                self.pipelines.insert(draw.key, pipeline);
            }
        }
        self.uniforms
            .upload(&self.device, &self.queue, &self.layouts.draw, constants);
    }

    fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        clear: ClearColor,
        draws: &[DrawCall],
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("cinder frame pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: f64::from(clear.r),
                        g: f64::from(clear.g),
                        b: f64::from(clear.b),
                        a: f64::from(clear.a),
                    }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let mut pipeline_bound = None;
        let mut vertex_bound = None;
        let mut index_bound = None;
        let mut texture_bound = None;

        for (i, draw) in draws.iter().enumerate() {
            let Some(pipeline) = self.pipelines.get(&draw.key) else {
                log::warn!("draw {i}: program {} no longer exists", draw.key.program);
                continue;
            };
            let (Some(vertices), Some(indices)) =
                (self.buffers.get(&draw.vertex), self.buffers.get(&draw.index.0))
            else {
                log::warn!("draw {i}: vertex or index buffer no longer exists");
                continue;
            };
            let material = match draw.texture {
                Some(name) => self.textures.get(&name),
                None => Some(&self.white),
            };
            let Some(material) = material else {
                log::warn!("draw {i}: texture no longer exists");
                continue;
            };
            let needed = u64::from(draw.index_count) * draw.index.1.size();
            if needed > indices.buffer.size() {
                log::warn!(
                    "draw {i}: {} indices exceed index buffer {} ({} bytes)",
                    draw.index_count,
                    draw.index.0,
                    indices.buffer.size()
                );
                continue;
            }

            if pipeline_bound != Some(draw.key) {
                pass.set_pipeline(pipeline);
                pipeline_bound = Some(draw.key);
            }
            pass.set_bind_group(0, &self.uniforms.bind_group, &[self.uniforms.offset(i)]);
            if vertex_bound != Some(draw.vertex) {
                pass.set_vertex_buffer(0, vertices.buffer.slice(..));
                vertex_bound = Some(draw.vertex);
            }
            if index_bound != Some(draw.index) {
                pass.set_index_buffer(indices.buffer.slice(..), index_format(draw.index.1));
                index_bound = Some(draw.index);
            }
            if texture_bound != Some(draw.texture) {
                pass.set_bind_group(1, &material.bind_group, &[]);
                texture_bound = Some(draw.texture);
            }
            pass.draw_indexed(0..draw.index_count, 0, 0..1);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    label: &str,
    (width, height): (u32, u32),
    format: PixelFormat,
    pixels: Option<&[u8]>,
) -> GpuTexture {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: objects::texture_format(format),
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    if let Some(pixels) = pixels {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * format.bytes_per_pixel()),
                rows_per_image: Some(height),
            },
            size,
        );
    }

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });

    GpuTexture {
        texture,
        bind_group,
        bytes_per_pixel: format.bytes_per_pixel(),
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_buffer(
        &mut self,
        desc: &BufferDescriptor,
    ) -> std::result::Result<ObjectName, DeviceError> {
        self.check_alive()?;
        let size = align_up(desc.size, wgpu::COPY_BUFFER_ALIGNMENT);
        let max = self.device.limits().max_buffer_size;
        if size > max {
            return Err(DeviceError::new(
                DeviceErrorCode::OutOfMemory,
                format!("buffer of {size} bytes exceeds the device limit of {max}"),
            ));
        }

        let mut shadow = vec![0u8; size as usize];
        if let Some(contents) = &desc.contents {
            shadow[..contents.len()].copy_from_slice(contents);
        }
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: desc.label.as_deref(),
                contents: &shadow,
                usage: GpuBuffer::usages(desc.usage),
            });

        let name = self.allocate_name()?;
        self.buffers.insert(name, GpuBuffer { buffer, shadow });
        Ok(name)
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
    ) -> std::result::Result<ObjectName, DeviceError> {
        self.check_alive()?;
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width > max || desc.height > max {
            return Err(DeviceError::new(
                DeviceErrorCode::UnsupportedFormat,
                format!(
                    "{}x{} texture exceeds the device limit of {max}",
                    desc.width, desc.height
                ),
            ));
        }

        let texture = upload_texture(
            &self.device,
            &self.queue,
            &self.layouts.material,
            self.sampler(desc.filter),
            desc.label.as_deref().unwrap_or("cinder texture"),
            (desc.width, desc.height),
            desc.format,
            desc.pixels.as_deref(),
        );

        let name = self.allocate_name()?;
        self.textures.insert(name, texture);
        Ok(name)
    }

    fn create_program(
        &mut self,
        desc: &ProgramDescriptor,
    ) -> std::result::Result<ObjectName, DeviceError> {
        self.check_alive()?;
        pipeline::validate_program(desc)?;

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(desc.source.as_str().into()),
            });

        let name = self.allocate_name()?;
        self.programs.insert(
            name,
            GpuProgram {
                module,
                vertex_entry: desc.vertex_entry.clone(),
                fragment_entry: desc.fragment_entry.clone(),
            },
        );
        Ok(name)
    }

    fn destroy_object(&mut self, object: DeviceObject) {
        let name = object.name;
        let found = match object.kind {
            ResourceKind::Buffer => self.buffers.remove(&name).map(|b| b.buffer.destroy()),
            ResourceKind::Texture => self.textures.remove(&name).map(|t| t.texture.destroy()),
            ResourceKind::Program => {
                self.pipelines.retain(|key, _| key.program != name);
                self.programs.remove(&name).map(drop)
            }
        };
        if found.is_none() {
            log::warn!("destroy of unknown {} {name}", object.kind);
        }
    }

    fn write_buffer(
        &mut self,
        buffer: ObjectName,
        offset: u64,
        data: &[u8],
    ) -> std::result::Result<(), DeviceError> {
        self.check_alive()?;
        let Some(target) = self.buffers.get_mut(&buffer) else {
            return Err(DeviceError::new(
                DeviceErrorCode::InvalidDescriptor,
                format!("no buffer {buffer}"),
            ));
        };
        if offset + data.len() as u64 > target.shadow.len() as u64 {
            return Err(DeviceError::new(
                DeviceErrorCode::InvalidDescriptor,
                format!("write of {} bytes at {offset} overruns buffer {buffer}", data.len()),
            ));
        }

        let range = target.patch(offset, data);
        self.queue.write_buffer(
            &target.buffer,
            range.start,
            &target.shadow[range.start as usize..range.end as usize],
        );
        Ok(())
    }

    fn write_texture(
        &mut self,
        texture: ObjectName,
        region: TextureRegion,
        data: &[u8],
    ) -> std::result::Result<(), DeviceError> {
        self.check_alive()?;
        let Some(target) = self.textures.get(&texture) else {
            return Err(DeviceError::new(
                DeviceErrorCode::InvalidDescriptor,
                format!("no texture {texture}"),
            ));
        };

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: region.first_row,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(region.bytes_per_row),
                rows_per_image: Some(region.rows),
            },
            wgpu::Extent3d {
                width: region.bytes_per_row / target.bytes_per_pixel,
                height: region.rows,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// wgpu does not support configuring a surface with a 0x0 size; in that
    /// case only the size is recorded and frames are skipped until it grows.
    fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == self.size {
            return;
        }
        self.size = (width, height);
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth = objects::create_depth_view(&self.device, width, height);
    }

    fn begin_frame(&mut self, clear: ClearColor) -> std::result::Result<FrameAcquire, DeviceError> {
        self.check_alive()?;
        if self.frame.take().is_some() {
            log::warn!("begin_frame without submit; the open frame is discarded");
        }
        self.bound = Bound::default();

        let mut frame = Frame {
            target: None,
            clear,
            draws: Vec::new(),
            constants: Vec::new(),
        };

        if self.size.0 == 0 || self.size.1 == 0 {
            self.frame = Some(frame);
            return Ok(FrameAcquire::Skip);
        }

        match self.surface.get_current_texture() {
            Ok(texture) => {
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                frame.target = Some((texture, view));
                self.frame = Some(frame);
                Ok(FrameAcquire::Ready)
            }
            Err(err) => match surface::classify_surface_error(&err) {
                SurfaceErrorAction::Reconfigure => {
                    log::debug!("surface {err}; reconfiguring");
                    self.reconfigure();
                    self.frame = Some(frame);
                    Ok(FrameAcquire::Skip)
                }
                SurfaceErrorAction::SkipFrame => {
                    log::debug!("surface {err}; skipping frame");
                    self.frame = Some(frame);
                    Ok(FrameAcquire::Skip)
                }
                SurfaceErrorAction::Fatal => {
                    self.lost.store(true, Ordering::Release);
                    Err(surface::surface_error(&err))
                }
            },
        }
    }

    fn bind_program(&mut self, program: ObjectName) {
        self.bound.program = Some(program);
    }

    fn bind_vertex_buffer(&mut self, buffer: ObjectName) {
        self.bound.vertex = Some(buffer);
    }

    fn bind_index_buffer(&mut self, buffer: ObjectName, format: IndexFormat) {
        self.bound.index = Some((buffer, format));
    }

    fn bind_texture(&mut self, texture: Option<ObjectName>) {
        self.bound.texture = texture;
    }

    fn set_blend(&mut self, blend: BlendMode) {
        self.bound.blend = blend;
    }

    fn set_depth(&mut self, depth: DepthState) {
        self.bound.depth = depth;
    }

    fn set_cull(&mut self, cull: CullMode) {
        self.bound.cull = cull;
    }

    fn draw_indexed(&mut self, constants: &DrawConstants, index_count: u32) {
        let Some(frame) = self.frame.as_mut() else {
            log::warn!("draw outside a frame ignored");
            return;
        };
        if frame.target.is_none() || index_count == 0 {
            return;
        }
        let b = self.bound;
        let (Some(program), Some(vertex), Some(index)) = (b.program, b.vertex, b.index) else {
            log::warn!("draw without program, vertex buffer and index buffer bound ignored");
            return;
        };

        frame.draws.push(DrawCall {
            key: PipelineKey {
                program,
                blend: b.blend,
                depth: b.depth,
                cull: b.cull,
            },
            vertex,
            index,
            texture: b.texture,
            index_count,
        });
        frame.constants.push(*constants);
    }

    fn submit(&mut self, fence: u64) -> std::result::Result<(), DeviceError> {
        self.check_alive()?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("cinder frame encoder"),
            });

        let mut presented = None;
        if let Some(frame) = self.frame.take() {
            if let Some((texture, view)) = frame.target {
                self.prepare(&frame.draws, &frame.constants);
                self.encode(&mut encoder, &view, frame.clear, &frame.draws);
                presented = Some(texture);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));

        let completed = Arc::clone(&self.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(fence, Ordering::AcqRel);
        });
        self.submitted = self.submitted.max(fence);

        if let Some(texture) = presented {
            self.present.put(texture);
        }
        self.check_alive()
    }

    fn completed_fence(&mut self) -> u64 {
        // Callbacks registered with `on_submitted_work_done` only fire on poll.
        let _ = self.device.poll(wgpu::PollType::Poll);
        self.completed.load(Ordering::Acquire)
    }

    fn wait_idle(&mut self) {
        let started = Instant::now();
        while self.completed_fence() < self.submitted {
            if self.lost.load(Ordering::Acquire) {
                return;
            }
            if started.elapsed() > IDLE_TIMEOUT {
                log::warn!(
                    "device still busy after {IDLE_TIMEOUT:?} (fence {} of {})",
                    self.completed.load(Ordering::Acquire),
                    self.submitted
                );
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
