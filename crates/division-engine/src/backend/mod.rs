//! Backend boundary.
//!
//! Registries are backend-agnostic: each entry owns one platform record produced
//! by a [`Backend`] and all physical work (allocation, upload, bind, draw) goes
//! through the trait. Two implementations ship with the crate:
//! - [`headless::HeadlessBackend`]: CPU memory plus a recorded call trace
//! - [`gpu::WgpuBackend`]: `wgpu` device/surface (OpenGL or Metal)

pub mod gpu;
pub mod headless;

use core::ops::{Deref, DerefMut, Range};

use crate::blend::{Blend, ColorMask};
use crate::color::Color;
use crate::error::{EngineError, Result};
use crate::layout::VertexLayout;
use crate::resources::Topology;
use crate::shader::{CompiledProgram, ShaderReflection, ShaderStage};

/// CPU-visible storage behind a platform buffer.
///
/// Mapping a buffer is borrowing these bytes; the owning registry hands the
/// modified range back to the backend on unmap.
pub trait PlatformBuffer {
    fn contents(&self) -> &[u8];
    fn contents_mut(&mut self) -> &mut [u8];
}

/// Uniform buffer slot a pipeline is built against.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniformSlot {
    pub binding: u32,
    pub stage: ShaderStage,
    pub size: u64,
}

/// Everything a backend needs to prepare pipeline state for one render pass.
pub struct PipelineDescriptor<'a, P> {
    pub program: &'a P,
    pub reflection: &'a ShaderReflection,
    pub layout: &'a VertexLayout,
    pub topology: Topology,
    pub uniforms: &'a [UniformSlot],
    pub blend: Blend,
    pub color_mask: ColorMask,
}

/// Physical resource and draw contract.
///
/// Per-frame calls arrive in the order
/// `begin_frame → {bind_vertex_buffer → bind_program → bind_uniform* → draw}* → present`.
pub trait Backend {
    type VertexBuffer: PlatformBuffer;
    type UniformBuffer: PlatformBuffer;
    type Program;
    type Pipeline;

    fn name(&self) -> &'static str;

    // ── vertex buffers ─────────────────────────────────────────────────────

    fn vertex_buffer_alloc(&mut self, layout: &VertexLayout, capacity: u32)
        -> Result<Self::VertexBuffer>;

    fn vertex_buffer_free(&mut self, buffer: Self::VertexBuffer);

    /// Makes `modified` (a byte range of the buffer contents) visible to later draws.
    fn vertex_buffer_unmap(&mut self, buffer: &mut Self::VertexBuffer, modified: Range<usize>);

    // ── uniform buffers ────────────────────────────────────────────────────

    fn uniform_buffer_alloc(&mut self, size: usize) -> Result<Self::UniformBuffer>;

    fn uniform_buffer_free(&mut self, buffer: Self::UniformBuffer);

    fn uniform_buffer_unmap(&mut self, buffer: &mut Self::UniformBuffer, modified: Range<usize>);

    // ── programs and pipelines ─────────────────────────────────────────────

    fn program_link(&mut self, program: &CompiledProgram) -> Result<Self::Program>;

    fn program_free(&mut self, program: Self::Program);

    fn pipeline_create(
        &mut self,
        desc: &PipelineDescriptor<'_, Self::Program>,
    ) -> Result<Self::Pipeline>;

    fn pipeline_free(&mut self, pipeline: Self::Pipeline);

    // ── frame ──────────────────────────────────────────────────────────────

    /// Starts a frame cleared to `clear`.
    ///
    /// Returns [`EngineError::FrameSkipped`] when no target is available this tick.
    fn begin_frame(&mut self, clear: Color) -> Result<()>;

    fn bind_vertex_buffer(&mut self, buffer: &Self::VertexBuffer) -> Result<()>;

    fn bind_program(&mut self, program: &Self::Program, pipeline: &Self::Pipeline) -> Result<()>;

    fn bind_uniform(
        &mut self,
        buffer: &Self::UniformBuffer,
        binding: u32,
        stage: ShaderStage,
    ) -> Result<()>;

    /// Draws `instances` copies of `[first, first + count)`.
    fn draw(&mut self, topology: Topology, first: u32, count: u32, instances: u32) -> Result<()>;

    /// Issues one logical draw per `(starts[i], counts[i])` pair, each with
    /// `instances` copies.
    fn multi_draw(
        &mut self,
        topology: Topology,
        starts: &[u32],
        counts: &[u32],
        instances: u32,
    ) -> Result<()>;

    fn present(&mut self) -> Result<()>;
}

type UnmapFn<B, P> = fn(&mut B, &mut P, Range<usize>);

/// Scoped exclusive access to a mapped buffer.
///
/// Dropping the guard returns the buffer: the backend is told which bytes were
/// touched and makes them visible to subsequent draws. The guard holds the owning
/// context mutably, so nothing can be drawn while it is alive.
pub struct BorrowedData<'a, B, P: PlatformBuffer> {
    backend: &'a mut B,
    buffer: &'a mut P,
    unmap: UnmapFn<B, P>,
    modified: Option<Range<usize>>,
}

impl<'a, B, P: PlatformBuffer> BorrowedData<'a, B, P> {
    pub(crate) fn new(backend: &'a mut B, buffer: &'a mut P, unmap: UnmapFn<B, P>) -> Self {
        Self { backend, buffer, unmap, modified: None }
    }

    /// Copies `bytes` to `offset` and marks only that range as modified.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let len = self.buffer.contents().len();
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= len)
            .ok_or_else(|| {
                EngineError::out_of_range(format!(
                    "write of {} bytes at offset {offset} exceeds buffer of {len} bytes",
                    bytes.len()
                ))
            })?;

        self.buffer.contents_mut()[offset..end].copy_from_slice(bytes);
        self.mark_modified(offset..end);
        Ok(())
    }

    /// Widens the modified range to include `range`.
    pub fn mark_modified(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        self.modified = Some(match self.modified.take() {
            Some(r) => r.start.min(range.start)..r.end.max(range.end),
            None => range,
        });
    }

    pub fn modified(&self) -> Option<Range<usize>> {
        self.modified.clone()
    }

    /// Returns the buffer now. Equivalent to dropping the guard.
    pub fn finish(self) {}
}

impl<B, P: PlatformBuffer> Deref for BorrowedData<'_, B, P> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buffer.contents()
    }
}

impl<B, P: PlatformBuffer> DerefMut for BorrowedData<'_, B, P> {
    /// Raw access marks the whole buffer as modified.
    fn deref_mut(&mut self) -> &mut [u8] {
        let len = self.buffer.contents().len();
        self.mark_modified(0..len);
        self.buffer.contents_mut()
    }
}

impl<B, P: PlatformBuffer> Drop for BorrowedData<'_, B, P> {
    fn drop(&mut self) {
        let range = self.modified.take().unwrap_or(0..0);
        (self.unmap)(self.backend, self.buffer, range);
    }
}
