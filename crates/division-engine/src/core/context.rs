use crate::backend::{Backend, BorrowedData};
use crate::color::Color;
use crate::error::{EngineError, ErrorReporter, Result};
use crate::frame::{self, FrameStats};
use crate::handle::{RenderPassId, ShaderProgramId, UniformBufferId, VertexBufferId};
use crate::layout::AttributeDescriptor;
use crate::resources::{
    RenderPassDescriptor, Resources, Topology, UniformBuffer, UniformBufferDescriptor,
    VertexBuffer, VertexObject,
};
use crate::shader::ShaderSource;
use crate::time::FrameTime;

use super::app::{App, AppControl};

/// Root owner of the backend and every registry.
///
/// All handles are scoped to the context that issued them. Mutating operations
/// report failures to the error callback (and the log) before returning them;
/// read-only queries only return them.
pub struct Context<B: Backend> {
    backend: B,
    resources: Resources<B>,
    clear_color: Color,
    reporter: ErrorReporter,
    frames_submitted: u64,
}

impl<B: Backend> Context<B> {
    pub fn new(backend: B) -> Self {
        log::info!("context created on the {} backend", backend.name());
        Self {
            backend,
            resources: Resources::default(),
            clear_color: Color::BLACK,
            reporter: ErrorReporter::default(),
            frames_submitted: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn resources(&self) -> &Resources<B> {
        &self.resources
    }

    pub fn clear_color(&self) -> Color {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    /// Installs the callback that receives every reported error.
    pub fn set_error_callback(&mut self, callback: impl FnMut(&EngineError) + 'static) {
        self.reporter.set_callback(Some(Box::new(callback)));
    }

    pub fn clear_error_callback(&mut self) {
        self.reporter.set_callback(None);
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    // ── vertex buffers ─────────────────────────────────────────────────────

    pub fn vertex_buffer_alloc(
        &mut self,
        attributes: &[AttributeDescriptor],
        capacity: u32,
        topology: Topology,
    ) -> Result<VertexBufferId> {
        let result =
            self.resources.vertex_buffers.allocate(&mut self.backend, attributes, capacity, topology);
        self.reporter.check(result)
    }

    pub fn vertex_buffer(&self, id: VertexBufferId) -> Result<&VertexBuffer<B>> {
        self.resources.vertex_buffers.get(id)
    }

    /// Scatters `vertex_count` tightly packed values of one attribute into
    /// object `object`, starting at its vertex `first_vertex`.
    ///
    /// Returns the number of vertices written, which is lower than requested
    /// when the object is too small.
    pub fn vertex_buffer_write_attribute(
        &mut self,
        id: VertexBufferId,
        object: usize,
        attribute: usize,
        source: &[u8],
        first_vertex: u32,
        vertex_count: u32,
    ) -> Result<u32> {
        let result = self.resources.vertex_buffers.write_attribute_data(
            &mut self.backend,
            id,
            object,
            attribute,
            source,
            first_vertex,
            vertex_count,
        );
        self.reporter.check(result)
    }

    /// Typed form of [`vertex_buffer_write_attribute`](Self::vertex_buffer_write_attribute):
    /// one `T` per vertex.
    pub fn vertex_buffer_write_values<T: bytemuck::Pod>(
        &mut self,
        id: VertexBufferId,
        object: usize,
        attribute: usize,
        values: &[T],
        first_vertex: u32,
    ) -> Result<u32> {
        let count = self.reporter.check(vertex_count(values.len()))?;
        self.vertex_buffer_write_attribute(
            id,
            object,
            attribute,
            bytemuck::cast_slice(values),
            first_vertex,
            count,
        )
    }

    /// Maps the buffer until the returned guard is dropped.
    pub fn vertex_buffer_borrow(
        &mut self,
        id: VertexBufferId,
    ) -> Result<BorrowedData<'_, B, B::VertexBuffer>> {
        if !self.resources.vertex_buffers.contains(id) {
            return Err(self.reporter.reported(id.stale()));
        }
        self.resources.vertex_buffers.borrow(&mut self.backend, id)
    }

    pub fn vertex_buffer_set_objects(
        &mut self,
        id: VertexBufferId,
        objects: &[VertexObject],
    ) -> Result<()> {
        let result = self.resources.vertex_buffers.set_objects(id, objects);
        self.reporter.check(result)
    }

    pub fn vertex_buffer_free(&mut self, id: VertexBufferId) -> Result<()> {
        let result = self.resources.vertex_buffers.free(&mut self.backend, id);
        self.reporter.check(result)
    }

    // ── uniform buffers ────────────────────────────────────────────────────

    pub fn uniform_buffer_alloc(
        &mut self,
        descriptor: UniformBufferDescriptor,
    ) -> Result<UniformBufferId> {
        let result = self.resources.uniform_buffers.allocate(&mut self.backend, descriptor);
        self.reporter.check(result)
    }

    pub fn uniform_buffer(&self, id: UniformBufferId) -> Result<&UniformBuffer<B>> {
        self.resources.uniform_buffers.get(id)
    }

    /// Maps the buffer until the returned guard is dropped.
    pub fn uniform_buffer_borrow(
        &mut self,
        id: UniformBufferId,
    ) -> Result<BorrowedData<'_, B, B::UniformBuffer>> {
        if !self.resources.uniform_buffers.contains(id) {
            return Err(self.reporter.reported(id.stale()));
        }
        self.resources.uniform_buffers.borrow(&mut self.backend, id)
    }

    /// Copies `value` to the start of the buffer.
    pub fn uniform_buffer_write<T: bytemuck::NoUninit>(
        &mut self,
        id: UniformBufferId,
        value: &T,
    ) -> Result<()> {
        let result = match self.resources.uniform_buffers.borrow(&mut self.backend, id) {
            Ok(mut data) => data.write(0, bytemuck::bytes_of(value)),
            Err(e) => Err(e),
        };
        self.reporter.check(result)
    }

    pub fn uniform_buffer_free(&mut self, id: UniformBufferId) -> Result<()> {
        let result = self.resources.uniform_buffers.free(&mut self.backend, id);
        self.reporter.check(result)
    }

    // ── shader programs ────────────────────────────────────────────────────

    pub fn shader_program_create(&mut self) -> ShaderProgramId {
        self.resources.shader_programs.create()
    }

    pub fn shader_program_attach(&mut self, id: ShaderProgramId, source: ShaderSource) -> Result<()> {
        let result = self.resources.shader_programs.attach(id, source);
        self.reporter.check(result)
    }

    pub fn shader_program_link(&mut self, id: ShaderProgramId) -> Result<()> {
        let result = self.resources.shader_programs.link(&mut self.backend, id);
        self.reporter.check(result)
    }

    pub fn shader_program_create_linked(&mut self, sources: &[ShaderSource]) -> Result<ShaderProgramId> {
        let result = self.resources.shader_programs.create_linked(&mut self.backend, sources);
        self.reporter.check(result)
    }

    pub fn shader_program_attribute_location(
        &self,
        id: ShaderProgramId,
        name: &str,
    ) -> Result<Option<u32>> {
        self.resources.shader_programs.attribute_location(id, name)
    }

    pub fn shader_program_uniform_location(
        &self,
        id: ShaderProgramId,
        name: &str,
    ) -> Result<Option<u32>> {
        self.resources.shader_programs.uniform_location(id, name)
    }

    pub fn shader_program_free(&mut self, id: ShaderProgramId) -> Result<()> {
        let result = self.resources.shader_programs.free(&mut self.backend, id);
        self.reporter.check(result)
    }

    // ── render passes ──────────────────────────────────────────────────────

    pub fn render_pass_alloc(&mut self, desc: &RenderPassDescriptor) -> Result<RenderPassId> {
        let Resources { vertex_buffers, uniform_buffers, shader_programs, render_passes } =
            &mut self.resources;
        let result = render_passes.allocate(
            &mut self.backend,
            desc,
            vertex_buffers,
            uniform_buffers,
            shader_programs,
        );
        self.reporter.check(result)
    }

    pub fn render_pass(&self, id: RenderPassId) -> Result<&RenderPassDescriptor> {
        self.resources.render_passes.get(id).map(|p| p.descriptor())
    }

    /// Hands a copy of the pass descriptor to `edit`, then validates the result
    /// and rebuilds the pass in place. A rejected edit leaves the pass as it was.
    pub fn render_pass_update(
        &mut self,
        id: RenderPassId,
        edit: impl FnOnce(&mut RenderPassDescriptor),
    ) -> Result<()> {
        let Resources { vertex_buffers, uniform_buffers, shader_programs, render_passes } =
            &mut self.resources;
        let result = render_passes.get(id).map(|p| p.descriptor().clone()).and_then(|mut desc| {
            edit(&mut desc);
            render_passes.update(
                &mut self.backend,
                id,
                &desc,
                vertex_buffers,
                uniform_buffers,
                shader_programs,
            )
        });
        self.reporter.check(result)
    }

    pub fn render_pass_free(&mut self, id: RenderPassId) -> Result<()> {
        let result = self.resources.render_passes.free(&mut self.backend, id);
        self.reporter.check(result)
    }

    /// Registered passes in submission order.
    pub fn render_passes(&self) -> impl Iterator<Item = (RenderPassId, &RenderPassDescriptor)> + '_ {
        self.resources.render_passes.iter_in_order().map(|(id, p)| (id, p.descriptor()))
    }

    // ── frame ──────────────────────────────────────────────────────────────

    /// Clears, replays every render pass in registration order, presents.
    pub fn draw_frame(&mut self) -> Result<FrameStats> {
        let result =
            frame::submit_frame(&mut self.backend, &self.resources, self.clear_color, &mut self.reporter);
        let stats = self.reporter.check(result)?;
        if !stats.frame_skipped {
            self.frames_submitted += 1;
        }
        Ok(stats)
    }

    /// One host tick: the update callback, then one frame unless the app exits.
    pub fn tick<A>(&mut self, app: &mut A, time: FrameTime) -> Result<AppControl>
    where
        A: App<B> + ?Sized,
    {
        if app.update(self, time) == AppControl::Exit {
            return Ok(AppControl::Exit);
        }
        self.draw_frame()?;
        Ok(AppControl::Continue)
    }

    /// Frees every resource. Handles issued so far become stale.
    pub fn release_all(&mut self) {
        self.resources.release_all(&mut self.backend);
    }
}

fn vertex_count(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        EngineError::out_of_range(format!("{len} values exceed the largest vertex count"))
    })
}

impl<B: Backend> Drop for Context<B> {
    fn drop(&mut self) {
        self.release_all();
        log::debug!("context released after {} frames", self.frames_submitted);
    }
}
