use std::num::NonZeroU64;

use wgpu::naga;

use crate::device::{
    BlendMode, CullMode, DepthState, DeviceError, DeviceErrorCode, DrawConstants, ObjectName,
};
use crate::resource::ProgramDescriptor;

pub(super) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const VERTEX_ATTRS: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

/// Bindings every program may declare, as `(group, binding)`.
const BINDINGS: [(u32, u32); 3] = [(0, 0), (1, 0), (1, 1)];

/// Everything a render pipeline is specialized on.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(super) struct PipelineKey {
    pub program: ObjectName,
    pub blend: BlendMode,
    pub depth: DepthState,
    pub cull: CullMode,
}

/// A compiled program: the module plus its entry points.
pub(super) struct GpuProgram {
    pub module: wgpu::ShaderModule,
    pub vertex_entry: String,
    pub fragment_entry: String,
}

/// Bind group layouts and the pipeline layout shared by all programs.
pub(super) struct Layouts {
    pub draw: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
    pub pipeline: wgpu::PipelineLayout,
}

fn draw_constants_size() -> NonZeroU64 {
    NonZeroU64::new(std::mem::size_of::<DrawConstants>() as u64).unwrap_or(NonZeroU64::MIN)
}

impl Layouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let draw = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cinder draw constants bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: Some(draw_constants_size()),
                },
                count: None,
            }],
        });

        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cinder material bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cinder pipeline layout"),
            bind_group_layouts: &[&draw, &material],
            immediate_size: 0,
        });

        Self {
            draw,
            material,
            pipeline,
        }
    }
}

/// Parses and validates WGSL before it reaches the device, so a bad shader is
/// reported as `ShaderCompilation` instead of tripping wgpu's error handler.
pub(super) fn validate_program(desc: &ProgramDescriptor) -> Result<(), DeviceError> {
    let compile_error = |message: String| DeviceError::new(DeviceErrorCode::ShaderCompilation, message);

    let module = naga::front::wgsl::parse_str(&desc.source)
        .map_err(|e| compile_error(e.emit_to_string(&desc.source)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .map_err(|e| compile_error(format!("shader validation failed: {e}")))?;

    for (entry, stage) in [
        (&desc.vertex_entry, naga::ShaderStage::Vertex),
        (&desc.fragment_entry, naga::ShaderStage::Fragment),
    ] {
        if !module
            .entry_points
            .iter()
            .any(|ep| ep.name == *entry && ep.stage == stage)
        {
            return Err(compile_error(format!("missing {stage:?} entry point `{entry}`")));
        }
    }

    for (_, var) in module.global_variables.iter() {
        if let Some(rb) = &var.binding {
            if !BINDINGS.contains(&(rb.group, rb.binding)) {
                return Err(compile_error(format!(
                    "binding @group({}) @binding({}) is not provided by the engine",
                    rb.group, rb.binding
                )));
            }
        }
    }

    Ok(())
}

fn blend_state(blend: BlendMode) -> Option<wgpu::BlendState> {
    let component = |src, dst| wgpu::BlendComponent {
        src_factor: src,
        dst_factor: dst,
        operation: wgpu::BlendOperation::Add,
    };
    match blend {
        BlendMode::Opaque => None,
        // Premultiplied alpha.
        BlendMode::Alpha => Some(wgpu::BlendState {
            color: component(wgpu::BlendFactor::One, wgpu::BlendFactor::OneMinusSrcAlpha),
            alpha: component(wgpu::BlendFactor::One, wgpu::BlendFactor::OneMinusSrcAlpha),
        }),
        BlendMode::Additive => Some(wgpu::BlendState {
            color: component(wgpu::BlendFactor::One, wgpu::BlendFactor::One),
            alpha: component(wgpu::BlendFactor::One, wgpu::BlendFactor::One),
        }),
    }
}

fn depth_state(depth: DepthState) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: depth.write,
        depth_compare: if depth.test {
            wgpu::CompareFunction::Less
        } else {
            wgpu::CompareFunction::Always
        },
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

fn cull_face(cull: CullMode) -> Option<wgpu::Face> {
    match cull {
        CullMode::None => None,
        CullMode::Back => Some(wgpu::Face::Back),
        CullMode::Front => Some(wgpu::Face::Front),
    }
}

pub(super) fn create_pipeline(
    device: &wgpu::Device,
    layouts: &Layouts,
    program: &GpuProgram,
    key: PipelineKey,
    color_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    log::debug!(
        "building pipeline for program {} ({:?}, {:?}, {:?})",
        key.program,
        key.blend,
        key.depth,
        key.cull
    );

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("cinder pipeline"),
        layout: Some(&layouts.pipeline),

        vertex: wgpu::VertexState {
            module: &program.module,
            entry_point: Some(program.vertex_entry.as_str()),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<crate::render::Vertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &VERTEX_ATTRS,
            }],
        },

        fragment: Some(wgpu::FragmentState {
            module: &program.module,
            entry_point: Some(program.fragment_entry.as_str()),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: blend_state(key.blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),

        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: cull_face(key.cull),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },

        depth_stencil: Some(depth_state(key.depth)),
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}
