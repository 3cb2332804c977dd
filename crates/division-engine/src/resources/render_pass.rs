use crate::backend::{Backend, PipelineDescriptor, UniformSlot};
use crate::blend::{Blend, ColorMask};
use crate::error::{EngineError, Result};
use crate::handle::{Arena, RenderPassId, ShaderProgramId, UniformBufferId, VertexBufferId, kind};
use crate::shader::ShaderStage;

use super::{ShaderProgramRegistry, UniformBufferRegistry, VertexBufferRegistry};

/// Vertices a pass draws from its buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum DrawRange {
    /// One draw over `[first, first + count)`.
    Vertices { first: u32, count: u32 },
    /// One multi-draw over every object of the buffer.
    #[default]
    Objects,
}

/// A single recorded draw command.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor {
    pub vertex_buffer: VertexBufferId,
    pub program: ShaderProgramId,
    pub uniforms: Vec<UniformBufferId>,
    pub range: DrawRange,
    pub blend: Blend,
    pub color_mask: ColorMask,
    /// Instances per draw; at least one.
    pub instances: u32,
}

impl RenderPassDescriptor {
    /// Draws every object of `vertex_buffer` with `program`, no uniforms, one
    /// instance, [`Blend::REPLACE`] and an RGB write mask.
    pub fn new(vertex_buffer: VertexBufferId, program: ShaderProgramId) -> Self {
        Self {
            vertex_buffer,
            program,
            uniforms: Vec::new(),
            range: DrawRange::Objects,
            blend: Blend::default(),
            color_mask: ColorMask::default(),
            instances: 1,
        }
    }

    pub fn uniform(mut self, buffer: UniformBufferId) -> Self {
        self.uniforms.push(buffer);
        self
    }

    pub fn uniforms(mut self, buffers: &[UniformBufferId]) -> Self {
        self.uniforms.extend_from_slice(buffers);
        self
    }

    pub fn vertices(mut self, first: u32, count: u32) -> Self {
        self.range = DrawRange::Vertices { first, count };
        self
    }

    pub fn objects(mut self) -> Self {
        self.range = DrawRange::Objects;
        self
    }

    pub fn blend(mut self, blend: Blend) -> Self {
        self.blend = blend;
        self
    }

    pub fn color_mask(mut self, mask: ColorMask) -> Self {
        self.color_mask = mask;
        self
    }

    pub fn instances(mut self, count: u32) -> Self {
        self.instances = count;
        self
    }
}

pub struct RenderPass<B: Backend> {
    descriptor: RenderPassDescriptor,
    pipeline: B::Pipeline,
}

impl<B: Backend> RenderPass<B> {
    pub fn descriptor(&self) -> &RenderPassDescriptor {
        &self.descriptor
    }

    pub fn pipeline(&self) -> &B::Pipeline {
        &self.pipeline
    }
}

/// Render passes in registration order.
///
/// Registration order is the only ordering: there is no priority or sort key.
pub struct RenderPassRegistry<B: Backend> {
    entries: Arena<kind::RenderPass, RenderPass<B>>,
    order: Vec<RenderPassId>,
}

impl<B: Backend> Default for RenderPassRegistry<B> {
    fn default() -> Self {
        Self { entries: Arena::new(), order: Vec::new() }
    }
}

impl<B: Backend> RenderPassRegistry<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: RenderPassId) -> Result<&RenderPass<B>> {
        self.entries.try_get(id)
    }

    /// Validates `desc` against the live resources, prepares its pipeline and
    /// appends it. The descriptor is copied; the caller keeps ownership.
    pub fn allocate(
        &mut self,
        backend: &mut B,
        desc: &RenderPassDescriptor,
        vertex_buffers: &VertexBufferRegistry<B>,
        uniform_buffers: &UniformBufferRegistry<B>,
        programs: &ShaderProgramRegistry<B>,
    ) -> Result<RenderPassId> {
        let pipeline = prepare(backend, desc, vertex_buffers, uniform_buffers, programs)?;

        let id = self.entries.insert(RenderPass { descriptor: desc.clone(), pipeline });
        self.order.push(id);
        log::debug!(
            "render pass {id} registered at position {}: {:?}, {} uniforms",
            self.order.len() - 1,
            desc.range,
            desc.uniforms.len()
        );
        Ok(id)
    }

    /// Replaces the descriptor of a live pass and rebuilds its pipeline. The
    /// pass keeps its position. On failure the previous descriptor stays.
    pub fn update(
        &mut self,
        backend: &mut B,
        id: RenderPassId,
        desc: &RenderPassDescriptor,
        vertex_buffers: &VertexBufferRegistry<B>,
        uniform_buffers: &UniformBufferRegistry<B>,
        programs: &ShaderProgramRegistry<B>,
    ) -> Result<()> {
        if !self.entries.contains(id) {
            return Err(id.stale());
        }
        let pipeline = prepare(backend, desc, vertex_buffers, uniform_buffers, programs)?;

        let pass = self.entries.try_get_mut(id)?;
        pass.descriptor = desc.clone();
        let previous = std::mem::replace(&mut pass.pipeline, pipeline);
        backend.pipeline_free(previous);
        log::debug!("render pass {id} updated");
        Ok(())
    }

    /// Removes a pass; the remaining passes keep their relative order.
    pub fn free(&mut self, backend: &mut B, id: RenderPassId) -> Result<()> {
        let pass = self.entries.remove(id).ok_or_else(|| id.stale())?;
        self.order.retain(|&p| p != id);
        backend.pipeline_free(pass.pipeline);
        log::debug!("render pass {id} freed");
        Ok(())
    }

    /// Lazily walks the passes in registration order. Restartable.
    pub fn iter_in_order(&self) -> impl Iterator<Item = (RenderPassId, &RenderPass<B>)> + '_ {
        self.order.iter().filter_map(|&id| self.entries.get(id).map(|p| (id, p)))
    }

    pub(crate) fn release_all(&mut self, backend: &mut B) {
        self.order.clear();
        for pass in self.entries.drain() {
            backend.pipeline_free(pass.pipeline);
        }
    }
}

/// Checks a descriptor against the live resources and builds its pipeline.
fn prepare<B: Backend>(
    backend: &mut B,
    desc: &RenderPassDescriptor,
    vertex_buffers: &VertexBufferRegistry<B>,
    uniform_buffers: &UniformBufferRegistry<B>,
    programs: &ShaderProgramRegistry<B>,
) -> Result<B::Pipeline> {
    let vb = vertex_buffers.get(desc.vertex_buffer)?;

    if let DrawRange::Vertices { first, count } = desc.range {
        let end = first.checked_add(count);
        if end.is_none_or(|end| end > vb.capacity()) {
            return Err(EngineError::out_of_range(format!(
                "pass range [{first}, +{count}) exceeds capacity {} of vertex buffer {}",
                vb.capacity(),
                desc.vertex_buffer
            )));
        }
    }
    if desc.instances == 0 {
        return Err(EngineError::configuration("a render pass draws at least one instance"));
    }

    let (program, reflection) = programs.linked(desc.program)?;

    for input in reflection.vertex_inputs() {
        let Some(attr) = vb.layout().attribute_at(input.location) else {
            return Err(EngineError::configuration(format!(
                "shader input location {} of program {} is not fed by vertex buffer {}",
                input.location, desc.program, desc.vertex_buffer
            )));
        };
        if input.scalar != Some(attr.ty.scalar()) {
            return Err(EngineError::configuration(format!(
                "shader input '{}' (location {}) of program {} reads {}, but vertex buffer {} \
                 feeds it {:?} ({:?} components)",
                input.name,
                input.location,
                desc.program,
                input.scalar.map_or_else(|| "an unsupported type".to_string(), |s| format!("{s:?}")),
                desc.vertex_buffer,
                attr.ty,
                attr.ty.scalar(),
            )));
        }
    }

    let mut slots: Vec<UniformSlot> = Vec::with_capacity(desc.uniforms.len());
    for &u in &desc.uniforms {
        let ub = uniform_buffers.get(u)?;
        let slot = UniformSlot {
            binding: ub.binding(),
            stage: ub.stage(),
            size: ub.data_bytes() as u64,
        };
        if slots.iter().any(|s| s.binding == slot.binding && s.stage == slot.stage) {
            return Err(EngineError::configuration(format!(
                "uniform buffer {u} repeats binding {} of the {:?} stage",
                slot.binding, slot.stage
            )));
        }
        slots.push(slot);
    }

    for declared in reflection.uniforms() {
        let slot = slots
            .iter()
            .find(|s| s.stage.bind_group() == declared.group && s.binding == declared.binding)
            .ok_or_else(|| {
                EngineError::configuration(format!(
                    "uniform '{}' (group {}, binding {}) of program {} has no buffer in the pass; \
                     vertex uniforms use group {}, fragment uniforms group {}",
                    declared.name,
                    declared.group,
                    declared.binding,
                    desc.program,
                    ShaderStage::Vertex.bind_group(),
                    ShaderStage::Fragment.bind_group(),
                ))
            })?;
        if slot.size < declared.size as u64 {
            return Err(EngineError::configuration(format!(
                "uniform '{}' of program {} needs {} bytes, its buffer holds {}",
                declared.name, desc.program, declared.size, slot.size
            )));
        }
    }

    backend.pipeline_create(&PipelineDescriptor {
        program,
        reflection,
        layout: vb.layout(),
        topology: vb.topology(),
        uniforms: &slots,
        blend: desc.blend,
        color_mask: desc.color_mask,
    })
}
