//! Per-frame command recording for the wgpu backend.
//!
//! Bind and draw calls arrive one at a time but wgpu wants them inside a render
//! pass that borrows the encoder, so draws are recorded with the bind state in
//! effect and encoded in one pass at present time.

use core::ops::Range;

use crate::error::{EngineError, Result};
use crate::shader::ShaderStage;

use super::resources::GpuPipeline;
use super::scope::validated;

struct RecordedDraw {
    pipeline: wgpu::RenderPipeline,
    bind_groups: [wgpu::BindGroup; 2],
    blend_constant: Option<wgpu::Color>,
    vertex_buffer: wgpu::Buffer,
    ranges: Vec<Range<u32>>,
    instances: u32,
}

struct BoundPipeline {
    pipeline: wgpu::RenderPipeline,
    group_layouts: [wgpu::BindGroupLayout; 2],
    slots: Vec<(ShaderStage, u32)>,
    blend_constant: Option<wgpu::Color>,
}

/// An acquired surface texture plus everything recorded against it.
pub(crate) struct FrameRecording {
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    clear: wgpu::Color,
    draws: Vec<RecordedDraw>,

    vertex_buffer: Option<wgpu::Buffer>,
    pipeline: Option<BoundPipeline>,
    uniforms: Vec<(ShaderStage, u32, wgpu::Buffer)>,
}

impl FrameRecording {
    pub(crate) fn new(surface_texture: wgpu::SurfaceTexture, clear: wgpu::Color) -> Self {
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            surface_texture,
            view,
            clear,
            draws: Vec::new(),
            vertex_buffer: None,
            pipeline: None,
            uniforms: Vec::new(),
        }
    }

    pub(crate) fn bind_vertex_buffer(&mut self, buffer: &wgpu::Buffer) {
        self.vertex_buffer = Some(buffer.clone());
    }

    /// Binding a program starts a new pass: uniform bindings are cleared.
    pub(crate) fn bind_pipeline(&mut self, pipeline: &GpuPipeline) {
        self.pipeline = Some(BoundPipeline {
            pipeline: pipeline.pipeline.clone(),
            group_layouts: pipeline.group_layouts.clone(),
            slots: pipeline.slots.iter().map(|s| (s.stage, s.binding)).collect(),
            blend_constant: pipeline.blend_constant,
        });
        self.uniforms.clear();
    }

    pub(crate) fn bind_uniform(&mut self, buffer: &wgpu::Buffer, binding: u32, stage: ShaderStage) {
        self.uniforms.retain(|(s, b, _)| !(*s == stage && *b == binding));
        self.uniforms.push((stage, binding, buffer.clone()));
    }

    pub(crate) fn record_draw(
        &mut self,
        device: &wgpu::Device,
        ranges: Vec<Range<u32>>,
        instances: u32,
    ) -> Result<()> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| EngineError::backend("draw without a bound program"))?;
        let vertex_buffer = self
            .vertex_buffer
            .clone()
            .ok_or_else(|| EngineError::backend("draw without a bound vertex buffer"))?;

        let bind_groups = [
            self.bind_group(device, pipeline, ShaderStage::Vertex)?,
            self.bind_group(device, pipeline, ShaderStage::Fragment)?,
        ];

        self.draws.push(RecordedDraw {
            pipeline: pipeline.pipeline.clone(),
            bind_groups,
            blend_constant: pipeline.blend_constant,
            vertex_buffer,
            ranges,
            instances,
        });
        Ok(())
    }

    fn bind_group(
        &self,
        device: &wgpu::Device,
        pipeline: &BoundPipeline,
        stage: ShaderStage,
    ) -> Result<wgpu::BindGroup> {
        let mut entries = Vec::new();
        for &(_, binding) in pipeline.slots.iter().filter(|(s, _)| *s == stage) {
            let (_, _, buffer) = self
                .uniforms
                .iter()
                .find(|(s, b, _)| *s == stage && *b == binding)
                .ok_or_else(|| {
                    EngineError::UnboundUniform(format!(
                        "{stage:?} binding {binding} has no uniform buffer"
                    ))
                })?;
            entries.push(wgpu::BindGroupEntry { binding, resource: buffer.as_entire_binding() });
        }

        let group = stage.bind_group() as usize;
        validated(device, "uniform bind group", || {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("division uniforms bind group"),
                layout: &pipeline.group_layouts[group],
                entries: &entries,
            })
        })
    }

    /// Encodes the recorded draws into one cleared render pass and submits them.
    pub(crate) fn submit(self, device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::SurfaceTexture {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("division frame encoder"),
        });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("division frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for draw in &self.draws {
                rpass.set_pipeline(&draw.pipeline);
                for (index, group) in draw.bind_groups.iter().enumerate() {
                    rpass.set_bind_group(index as u32, group, &[]);
                }
                if let Some(constant) = draw.blend_constant {
                    rpass.set_blend_constant(constant);
                }
                rpass.set_vertex_buffer(0, draw.vertex_buffer.slice(..));
                for range in draw.ranges.iter().filter(|r| !r.is_empty()) {
                    rpass.draw(range.clone(), 0..draw.instances);
                }
            }
        }

        queue.submit(std::iter::once(encoder.finish()));
        drop(self.view);
        self.surface_texture
    }
}
