//! Platform records of the wgpu backend and their creation.

use core::ops::Range;

use crate::backend::{PipelineDescriptor, PlatformBuffer, UniformSlot};
use crate::blend::{Blend, BlendFactor, BlendOperation, ColorMask};
use crate::color::Color;
use crate::error::{EngineError, Result};
use crate::layout::{AttributeType, VertexLayout};
use crate::resources::Topology;
use crate::shader::{CompiledProgram, ShaderStage};

use super::scope::validated;

const UNIFORM_ALIGNMENT: u64 = 16;

#[inline]
fn align_up(n: u64, to: u64) -> u64 {
    n.div_ceil(to) * to
}

/// GPU buffer with a CPU shadow copy that mapping hands out.
pub struct GpuBuffer {
    buffer: wgpu::Buffer,
    // Padded to the GPU buffer size; only `len` bytes are visible.
    shadow: Vec<u8>,
    len: usize,
}

impl GpuBuffer {
    pub(crate) fn new(
        device: &wgpu::Device,
        label: &str,
        len: usize,
        usage: wgpu::BufferUsages,
        alignment: u64,
    ) -> Result<Self> {
        let size = align_up(len.max(1) as u64, alignment);
        let buffer = validated(device, label, || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: usage | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;
        Ok(Self { buffer, shadow: vec![0; size as usize], len })
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Uploads `range` of the shadow copy, widened to the copy alignment.
    pub(crate) fn upload(&self, queue: &wgpu::Queue, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
        let start = range.start / align * align;
        let end = range.end.div_ceil(align) * align;
        queue.write_buffer(&self.buffer, start as u64, &self.shadow[start..end]);
    }
}

impl PlatformBuffer for GpuBuffer {
    fn contents(&self) -> &[u8] {
        &self.shadow[..self.len]
    }

    fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.shadow[..self.len]
    }
}

pub(crate) fn vertex_buffer(device: &wgpu::Device, layout: &VertexLayout, capacity: u32) -> Result<GpuBuffer> {
    let uses_f64 = layout.attributes().iter().any(|a| a.ty == AttributeType::Double);
    if uses_f64 && !device.features().contains(wgpu::Features::VERTEX_ATTRIBUTE_64BIT) {
        return Err(EngineError::backend("device does not support 64-bit vertex attributes"));
    }

    let len = layout.stride() as usize * capacity as usize;
    GpuBuffer::new(
        device,
        "division vertex buffer",
        len,
        wgpu::BufferUsages::VERTEX,
        wgpu::COPY_BUFFER_ALIGNMENT,
    )
}

pub(crate) fn uniform_buffer(device: &wgpu::Device, size: usize) -> Result<GpuBuffer> {
    let max = device.limits().max_uniform_buffer_binding_size as usize;
    if size > max {
        return Err(EngineError::backend(format!(
            "uniform buffer of {size} bytes exceeds device limit of {max}"
        )));
    }
    GpuBuffer::new(
        device,
        "division uniform buffer",
        size,
        wgpu::BufferUsages::UNIFORM,
        UNIFORM_ALIGNMENT,
    )
}

struct StageModule {
    module: wgpu::ShaderModule,
    entry_point: String,
}

/// Shader modules of a linked program.
pub struct GpuProgram {
    vertex: StageModule,
    fragment: Option<StageModule>,
}

pub(crate) fn program(device: &wgpu::Device, compiled: &CompiledProgram) -> Result<GpuProgram> {
    let module = |stage: ShaderStage| -> Result<Option<StageModule>> {
        let Some(s) = compiled.stage(stage) else {
            return Ok(None);
        };
        let label = format!("division {stage:?} shader");
        let module = validated(device, &label, || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(s.source.as_str().into()),
            })
        })?;
        Ok(Some(StageModule { module, entry_point: s.entry_point.clone() }))
    };

    let vertex = module(ShaderStage::Vertex)?
        .ok_or_else(|| EngineError::backend("program has no vertex stage"))?;
    Ok(GpuProgram { vertex, fragment: module(ShaderStage::Fragment)? })
}

/// Render pipeline plus the uniform slots it expects, one bind group per stage.
pub struct GpuPipeline {
    pub(crate) pipeline: wgpu::RenderPipeline,
    pub(crate) group_layouts: [wgpu::BindGroupLayout; 2],
    pub(crate) slots: Vec<UniformSlot>,
    pub(crate) blend_constant: Option<wgpu::Color>,
}

pub(crate) fn pipeline(
    device: &wgpu::Device,
    target: wgpu::TextureFormat,
    desc: &PipelineDescriptor<'_, GpuProgram>,
) -> Result<GpuPipeline> {
    let fragment = desc
        .program
        .fragment
        .as_ref()
        .ok_or_else(|| EngineError::configuration("a drawable program needs a fragment stage"))?;

    let blend_constant = blend_constant(&desc.blend)?;

    let (pipeline, group_layouts) = validated(device, "render pipeline", || {
        let group_layouts = ShaderStage::ALL.map(|stage| {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = desc
                .uniforms
                .iter()
                .filter(|s| s.stage == stage)
                .map(|s| wgpu::BindGroupLayoutEntry {
                    binding: s.binding,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                })
                .collect();

            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("division {stage:?} uniforms bgl")),
                entries: &entries,
            })
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("division pipeline layout"),
            bind_group_layouts: &[&group_layouts[0], &group_layouts[1]],
            immediate_size: 0,
        });

        let attributes = vertex_attributes(desc.layout);
        let buffers = [wgpu::VertexBufferLayout {
            array_stride: desc.layout.stride() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("division pipeline"),
            layout: Some(&pipeline_layout),

            vertex: wgpu::VertexState {
                module: &desc.program.vertex.module,
                entry_point: Some(desc.program.vertex.entry_point.as_str()),
                compilation_options: Default::default(),
                buffers: &buffers,
            },

            fragment: Some(wgpu::FragmentState {
                module: &fragment.module,
                entry_point: Some(fragment.entry_point.as_str()),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target,
                    blend: Some(blend_state(&desc.blend)),
                    write_mask: color_writes(desc.color_mask),
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: primitive_topology(desc.topology),
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        (pipeline, group_layouts)
    })?;

    Ok(GpuPipeline { pipeline, group_layouts, slots: desc.uniforms.to_vec(), blend_constant })
}

pub(crate) fn wgpu_color(color: Color) -> wgpu::Color {
    let [r, g, b, a] = color.to_array().map(f64::from);
    wgpu::Color { r, g, b, a }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::SrcAlphaSaturated => wgpu::BlendFactor::SrcAlphaSaturated,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::ConstantColor | BlendFactor::ConstantAlpha => wgpu::BlendFactor::Constant,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::OneMinusConstantColor | BlendFactor::OneMinusConstantAlpha => {
            wgpu::BlendFactor::OneMinusConstant
        }
    }
}

pub(crate) fn blend_state(blend: &Blend) -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: blend_factor(blend.src),
        dst_factor: blend_factor(blend.dst),
        operation: match blend.operation {
            BlendOperation::Add => wgpu::BlendOperation::Add,
            BlendOperation::Subtract => wgpu::BlendOperation::Subtract,
            BlendOperation::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
            BlendOperation::Min => wgpu::BlendOperation::Min,
            BlendOperation::Max => wgpu::BlendOperation::Max,
        },
    };
    wgpu::BlendState { color: component, alpha: component }
}

/// wgpu has a single RGBA blend constant, so alpha-only factors read the
/// constant's alpha splatted over all four channels.
pub(crate) fn blend_constant(blend: &Blend) -> Result<Option<wgpu::Color>> {
    let factors = [blend.src, blend.dst];
    let color = factors.iter().any(|f| f.uses_constant_color());
    let alpha = factors.iter().any(|f| f.uses_constant_alpha());

    match (color, alpha) {
        (false, false) => Ok(None),
        (true, false) => Ok(Some(wgpu_color(blend.constant))),
        (false, true) => {
            let a = blend.constant.a;
            Ok(Some(wgpu_color(Color::new(a, a, a, a))))
        }
        (true, true) => Err(EngineError::configuration(
            "constant color and constant alpha factors cannot share a pass on wgpu",
        )),
    }
}

pub(crate) fn color_writes(mask: ColorMask) -> wgpu::ColorWrites {
    let mut writes = wgpu::ColorWrites::empty();
    for (channel, write) in [
        (ColorMask::R, wgpu::ColorWrites::RED),
        (ColorMask::G, wgpu::ColorWrites::GREEN),
        (ColorMask::B, wgpu::ColorWrites::BLUE),
        (ColorMask::A, wgpu::ColorWrites::ALPHA),
    ] {
        if mask.contains(channel) {
            writes |= write;
        }
    }
    writes
}

pub(crate) fn primitive_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Topology::Lines => wgpu::PrimitiveTopology::LineList,
        Topology::Points => wgpu::PrimitiveTopology::PointList,
    }
}

/// A 4x4 matrix occupies four consecutive `vec4` locations.
pub(crate) fn vertex_attributes(layout: &VertexLayout) -> Vec<wgpu::VertexAttribute> {
    let mut out = Vec::with_capacity(layout.attributes().len());
    for a in layout.attributes() {
        let format = match a.ty {
            AttributeType::Float => wgpu::VertexFormat::Float32,
            AttributeType::Double => wgpu::VertexFormat::Float64,
            AttributeType::Integer => wgpu::VertexFormat::Sint32,
            AttributeType::Vec2 => wgpu::VertexFormat::Float32x2,
            AttributeType::Vec3 => wgpu::VertexFormat::Float32x3,
            AttributeType::Vec4 | AttributeType::Mat4x4 => wgpu::VertexFormat::Float32x4,
        };
        for (column, location) in a.locations().enumerate() {
            out.push(wgpu::VertexAttribute {
                format,
                offset: (a.offset + column as u32 * format.size() as u32) as u64,
                shader_location: location,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::AttributeDescriptor;

    #[test]
    fn matrix_expands_to_four_columns() {
        let layout = VertexLayout::new(&[
            AttributeDescriptor::new(AttributeType::Vec2, 0),
            AttributeDescriptor::new(AttributeType::Mat4x4, 1),
            AttributeDescriptor::new(AttributeType::Integer, 5),
        ]);
        let attrs = vertex_attributes(&layout);

        let locations: Vec<_> = attrs.iter().map(|a| a.shader_location).collect();
        let offsets: Vec<_> = attrs.iter().map(|a| a.offset).collect();
        assert_eq!(locations, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(offsets, vec![0, 8, 24, 40, 56, 72]);
        assert_eq!(attrs[5].format, wgpu::VertexFormat::Sint32);
    }

    #[test]
    fn default_blend_replaces_and_keeps_alpha() {
        let state = blend_state(&Blend::default());
        assert_eq!(state, wgpu::BlendState::REPLACE);
        assert_eq!(color_writes(ColorMask::default()), wgpu::ColorWrites::COLOR);
        assert_eq!(color_writes(ColorMask::RGBA), wgpu::ColorWrites::ALL);
        assert_eq!(blend_constant(&Blend::default()).unwrap(), None);
    }

    #[test]
    fn alpha_blend_maps_to_wgpu_alpha_blending() {
        let state = blend_state(&Blend::ALPHA);
        assert_eq!(state.color, wgpu::BlendState::ALPHA_BLENDING.color);
    }

    #[test]
    fn constant_alpha_is_splatted() {
        let blend = Blend::new(BlendFactor::ConstantAlpha, BlendFactor::OneMinusConstantAlpha, BlendOperation::Add)
            .with_constant(Color::new(0.1, 0.2, 0.3, 0.5));
        assert_eq!(blend_constant(&blend).unwrap(), Some(wgpu::Color { r: 0.5, g: 0.5, b: 0.5, a: 0.5 }));

        let mixed = Blend::new(BlendFactor::ConstantColor, BlendFactor::ConstantAlpha, BlendOperation::Add);
        let err = blend_constant(&mixed).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn sizes_align_up() {
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(28, 4), 28);
        assert_eq!(align_up(30, 4), 32);
    }
}
