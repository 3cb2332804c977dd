//! CPU-only backend that records every frame call.
//!
//! Buffers live in host memory and each bind/draw/present is appended to a
//! trace, which makes submission order observable without a GPU.

use core::ops::Range;

use crate::blend::{Blend, ColorMask};
use crate::color::Color;
use crate::error::{EngineError, Result};
use crate::layout::VertexLayout;
use crate::resources::Topology;
use crate::shader::{CompiledProgram, ShaderStage};

use super::{Backend, PipelineDescriptor, PlatformBuffer};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    BeginFrame { clear: Color },
    BindVertexBuffer { buffer: u32 },
    BindProgram { program: u32, pipeline: u32 },
    BindUniform { buffer: u32, binding: u32, stage: ShaderStage },
    Draw { topology: Topology, first: u32, count: u32, instances: u32 },
    MultiDraw { topology: Topology, starts: Vec<u32>, counts: Vec<u32>, instances: u32 },
    Present,
}

/// Upload issued when a mapped buffer was returned.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Upload {
    pub buffer: u32,
    pub range: Range<usize>,
}

#[derive(Debug)]
pub struct HeadlessBuffer {
    id: u32,
    data: Vec<u8>,
}

impl HeadlessBuffer {
    /// Backend-wide identifier, as it appears in the trace.
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl PlatformBuffer for HeadlessBuffer {
    fn contents(&self) -> &[u8] {
        &self.data
    }

    fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[derive(Debug)]
pub struct HeadlessProgram {
    id: u32,
    stage_count: usize,
}

impl HeadlessProgram {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn stage_count(&self) -> usize {
        self.stage_count
    }
}

#[derive(Debug)]
pub struct HeadlessPipeline {
    id: u32,
    topology: Topology,
    stride: u32,
    blend: Blend,
    color_mask: ColorMask,
}

impl HeadlessPipeline {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn blend(&self) -> Blend {
        self.blend
    }

    pub fn color_mask(&self) -> ColorMask {
        self.color_mask
    }
}

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u32,
    trace: Vec<TraceEvent>,
    uploads: Vec<Upload>,
    in_frame: bool,
    frames_presented: u64,

    memory_limit: Option<usize>,
    allocated_bytes: usize,
    live_objects: usize,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails buffer allocations that would push resident bytes past `limit`.
    pub fn with_memory_limit(limit: usize) -> Self {
        Self { memory_limit: Some(limit), ..Self::default() }
    }

    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    /// Returns and clears the recorded trace.
    pub fn take_trace(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.trace)
    }

    pub fn uploads(&self) -> &[Upload] {
        &self.uploads
    }

    pub fn take_uploads(&mut self) -> Vec<Upload> {
        std::mem::take(&mut self.uploads)
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    /// Buffers, programs and pipelines not yet freed.
    pub fn live_objects(&self) -> usize {
        self.live_objects
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn alloc_buffer(&mut self, size: usize) -> Result<HeadlessBuffer> {
        let total = self.allocated_bytes + size;
        if let Some(limit) = self.memory_limit.filter(|&limit| total > limit) {
            return Err(EngineError::backend(format!(
                "out of memory: {size} bytes requested, {} of {limit} in use",
                self.allocated_bytes
            )));
        }

        self.allocated_bytes = total;
        self.live_objects += 1;
        Ok(HeadlessBuffer { id: self.next_id(), data: vec![0; size] })
    }

    fn free_buffer(&mut self, buffer: HeadlessBuffer) {
        self.allocated_bytes -= buffer.data.len();
        self.live_objects -= 1;
    }

    fn record_upload(&mut self, buffer: &HeadlessBuffer, range: Range<usize>) {
        if !range.is_empty() {
            self.uploads.push(Upload { buffer: buffer.id, range });
        }
    }

    fn record(&mut self, event: TraceEvent) -> Result<()> {
        if !self.in_frame {
            return Err(EngineError::backend(format!("{event:?} issued outside of a frame")));
        }
        log::trace!("headless: {event:?}");
        self.trace.push(event);
        Ok(())
    }
}

impl Backend for HeadlessBackend {
    type VertexBuffer = HeadlessBuffer;
    type UniformBuffer = HeadlessBuffer;
    type Program = HeadlessProgram;
    type Pipeline = HeadlessPipeline;

    fn name(&self) -> &'static str {
        "headless"
    }

    fn vertex_buffer_alloc(&mut self, layout: &VertexLayout, capacity: u32) -> Result<HeadlessBuffer> {
        self.alloc_buffer(layout.stride() as usize * capacity as usize)
    }

    fn vertex_buffer_free(&mut self, buffer: HeadlessBuffer) {
        self.free_buffer(buffer);
    }

    fn vertex_buffer_unmap(&mut self, buffer: &mut HeadlessBuffer, modified: Range<usize>) {
        self.record_upload(buffer, modified);
    }

    fn uniform_buffer_alloc(&mut self, size: usize) -> Result<HeadlessBuffer> {
        self.alloc_buffer(size)
    }

    fn uniform_buffer_free(&mut self, buffer: HeadlessBuffer) {
        self.free_buffer(buffer);
    }

    fn uniform_buffer_unmap(&mut self, buffer: &mut HeadlessBuffer, modified: Range<usize>) {
        self.record_upload(buffer, modified);
    }

    fn program_link(&mut self, program: &CompiledProgram) -> Result<HeadlessProgram> {
        self.live_objects += 1;
        Ok(HeadlessProgram { id: self.next_id(), stage_count: program.stages.len() })
    }

    fn program_free(&mut self, _program: HeadlessProgram) {
        self.live_objects -= 1;
    }

    fn pipeline_create(
        &mut self,
        desc: &PipelineDescriptor<'_, HeadlessProgram>,
    ) -> Result<HeadlessPipeline> {
        self.live_objects += 1;
        Ok(HeadlessPipeline {
            id: self.next_id(),
            topology: desc.topology,
            stride: desc.layout.stride(),
            blend: desc.blend,
            color_mask: desc.color_mask,
        })
    }

    fn pipeline_free(&mut self, _pipeline: HeadlessPipeline) {
        self.live_objects -= 1;
    }

    fn begin_frame(&mut self, clear: Color) -> Result<()> {
        if self.in_frame {
            return Err(EngineError::backend("frame already in progress"));
        }
        self.in_frame = true;
        self.record(TraceEvent::BeginFrame { clear })
    }

    fn bind_vertex_buffer(&mut self, buffer: &HeadlessBuffer) -> Result<()> {
        self.record(TraceEvent::BindVertexBuffer { buffer: buffer.id })
    }

    fn bind_program(&mut self, program: &HeadlessProgram, pipeline: &HeadlessPipeline) -> Result<()> {
        self.record(TraceEvent::BindProgram { program: program.id, pipeline: pipeline.id })
    }

    fn bind_uniform(&mut self, buffer: &HeadlessBuffer, binding: u32, stage: ShaderStage) -> Result<()> {
        self.record(TraceEvent::BindUniform { buffer: buffer.id, binding, stage })
    }

    fn draw(&mut self, topology: Topology, first: u32, count: u32, instances: u32) -> Result<()> {
        self.record(TraceEvent::Draw { topology, first, count, instances })
    }

    fn multi_draw(
        &mut self,
        topology: Topology,
        starts: &[u32],
        counts: &[u32],
        instances: u32,
    ) -> Result<()> {
        self.record(TraceEvent::MultiDraw {
            topology,
            starts: starts.to_vec(),
            counts: counts.to_vec(),
            instances,
        })
    }

    fn present(&mut self) -> Result<()> {
        self.record(TraceEvent::Present)?;
        self.in_frame = false;
        self.frames_presented += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{AttributeDescriptor, AttributeType};

    fn layout() -> VertexLayout {
        VertexLayout::new(&[AttributeDescriptor::new(AttributeType::Vec2, 0)])
    }

    #[test]
    fn buffers_are_zeroed_and_sized_by_stride() {
        let mut backend = HeadlessBackend::new();
        let buf = backend.vertex_buffer_alloc(&layout(), 3).unwrap();
        assert_eq!(buf.contents(), &[0u8; 24][..]);
        assert_eq!(backend.allocated_bytes(), 24);

        backend.vertex_buffer_free(buf);
        assert_eq!(backend.allocated_bytes(), 0);
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn memory_limit_fails_allocation() {
        let mut backend = HeadlessBackend::with_memory_limit(16);
        assert!(backend.uniform_buffer_alloc(16).is_ok());
        let err = backend.uniform_buffer_alloc(1).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn empty_unmap_records_no_upload() {
        let mut backend = HeadlessBackend::new();
        let mut buf = backend.uniform_buffer_alloc(16).unwrap();
        backend.uniform_buffer_unmap(&mut buf, 0..0);
        backend.uniform_buffer_unmap(&mut buf, 4..8);
        assert_eq!(backend.uploads(), &[Upload { buffer: buf.id(), range: 4..8 }]);
    }

    #[test]
    fn calls_outside_a_frame_are_rejected() {
        let mut backend = HeadlessBackend::new();
        assert!(backend.draw(Topology::Triangles, 0, 3, 1).is_err());
        assert!(backend.present().is_err());

        backend.begin_frame(Color::BLACK).unwrap();
        assert!(backend.begin_frame(Color::BLACK).is_err());
        backend.draw(Topology::Triangles, 0, 3, 2).unwrap();
        backend.present().unwrap();

        assert_eq!(backend.frames_presented(), 1);
        assert_eq!(
            backend.take_trace(),
            vec![
                TraceEvent::BeginFrame { clear: Color::BLACK },
                TraceEvent::Draw { topology: Topology::Triangles, first: 0, count: 3, instances: 2 },
                TraceEvent::Present,
            ]
        );
    }
}
