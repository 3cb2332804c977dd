//! Backend-agnostic resource registries.
//!
//! Each registry stores its entries in a generation-tagged arena; entries own
//! the platform record the backend produced for them. Registries never hold a
//! backend themselves: the owning `Context` passes it to every call.

mod render_pass;
mod shader_program;
mod uniform_buffer;
mod vertex_buffer;

pub use render_pass::{DrawRange, RenderPass, RenderPassDescriptor, RenderPassRegistry};
pub use shader_program::ShaderProgramRegistry;
pub use uniform_buffer::{UniformBuffer, UniformBufferDescriptor, UniformBufferRegistry};
pub use vertex_buffer::{Topology, VertexBuffer, VertexBufferRegistry, VertexObject};

use crate::backend::Backend;

/// The four registries owned by one context.
pub struct Resources<B: Backend> {
    pub vertex_buffers: VertexBufferRegistry<B>,
    pub uniform_buffers: UniformBufferRegistry<B>,
    pub shader_programs: ShaderProgramRegistry<B>,
    pub render_passes: RenderPassRegistry<B>,
}

impl<B: Backend> Default for Resources<B> {
    fn default() -> Self {
        Self {
            vertex_buffers: VertexBufferRegistry::new(),
            uniform_buffers: UniformBufferRegistry::new(),
            shader_programs: ShaderProgramRegistry::new(),
            render_passes: RenderPassRegistry::new(),
        }
    }
}

impl<B: Backend> Resources<B> {
    /// Frees every entry through `backend`, passes first.
    pub(crate) fn release_all(&mut self, backend: &mut B) {
        self.render_passes.release_all(backend);
        self.shader_programs.release_all(backend);
        self.uniform_buffers.release_all(backend);
        self.vertex_buffers.release_all(backend);
    }
}
