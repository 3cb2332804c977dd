use core::ops::Range;

use crate::backend::{Backend, BorrowedData, PlatformBuffer};
use crate::error::{EngineError, Result};
use crate::handle::{Arena, VertexBufferId, kind};
use crate::layout::{AttributeDescriptor, VertexAttribute, VertexLayout};

/// Primitive assembly mode of a vertex buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Topology {
    #[default]
    Triangles,
    Points,
    Lines,
}

impl TryFrom<i32> for Topology {
    type Error = EngineError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Triangles),
            1 => Ok(Self::Points),
            2 => Ok(Self::Lines),
            other => Err(EngineError::configuration(format!("unknown topology {other}"))),
        }
    }
}

/// Contiguous vertex range of one logical mesh packed into a shared buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexObject {
    pub start_vertex: u32,
    pub vertex_count: u32,
}

impl VertexObject {
    pub const fn new(start_vertex: u32, vertex_count: u32) -> Self {
        Self { start_vertex, vertex_count }
    }

    #[inline]
    pub const fn end_vertex(&self) -> u32 {
        self.start_vertex + self.vertex_count
    }
}

pub struct VertexBuffer<B: Backend> {
    layout: VertexLayout,
    capacity: u32,
    topology: Topology,
    objects: Vec<VertexObject>,
    // Parallel arrays handed to multi-draw as-is.
    starts: Vec<u32>,
    counts: Vec<u32>,
    platform: B::VertexBuffer,
}

impl<B: Backend> VertexBuffer<B> {
    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        self.layout.attributes()
    }

    pub fn stride(&self) -> u32 {
        self.layout.stride()
    }

    /// Total vertex capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn objects(&self) -> &[VertexObject] {
        &self.objects
    }

    pub fn starts(&self) -> &[u32] {
        &self.starts
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn platform(&self) -> &B::VertexBuffer {
        &self.platform
    }

    /// Current buffer contents, `stride * capacity` bytes.
    pub fn contents(&self) -> &[u8] {
        self.platform.contents()
    }

    fn replace_objects(&mut self, objects: Vec<VertexObject>) {
        self.starts = objects.iter().map(|o| o.start_vertex).collect();
        self.counts = objects.iter().map(|o| o.vertex_count).collect();
        self.objects = objects;
    }
}

pub struct VertexBufferRegistry<B: Backend> {
    entries: Arena<kind::VertexBuffer, VertexBuffer<B>>,
}

impl<B: Backend> Default for VertexBufferRegistry<B> {
    fn default() -> Self {
        Self { entries: Arena::new() }
    }
}

impl<B: Backend> VertexBufferRegistry<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: VertexBufferId) -> bool {
        self.entries.contains(id)
    }

    pub fn get(&self, id: VertexBufferId) -> Result<&VertexBuffer<B>> {
        self.entries.try_get(id)
    }

    /// Computes the layout, reserves `stride * capacity` bytes and records one
    /// object spanning the whole buffer.
    pub fn allocate(
        &mut self,
        backend: &mut B,
        attributes: &[AttributeDescriptor],
        capacity: u32,
        topology: Topology,
    ) -> Result<VertexBufferId> {
        if attributes.is_empty() {
            return Err(EngineError::configuration("vertex buffer needs at least one attribute"));
        }
        if capacity == 0 {
            return Err(EngineError::configuration("vertex buffer capacity must be non-zero"));
        }

        let layout = VertexLayout::new(attributes);
        let platform = backend.vertex_buffer_alloc(&layout, capacity)?;

        let mut buffer = VertexBuffer {
            layout,
            capacity,
            topology,
            objects: Vec::new(),
            starts: Vec::new(),
            counts: Vec::new(),
            platform,
        };
        buffer.replace_objects(vec![VertexObject::new(0, capacity)]);

        let stride = buffer.stride();
        let id = self.entries.insert(buffer);
        log::debug!(
            "vertex buffer {id} allocated: {} attributes, stride {stride}, capacity {capacity}, {topology:?}",
            attributes.len()
        );
        Ok(id)
    }

    /// Scatters tightly packed values of one attribute into the interleaved buffer.
    ///
    /// Vertices are addressed relative to the object's start. Requests running
    /// past the object are clamped and logged; the number of vertices actually
    /// written is returned.
    #[allow(clippy::too_many_arguments)]
    pub fn write_attribute_data(
        &mut self,
        backend: &mut B,
        id: VertexBufferId,
        object_index: usize,
        attribute_index: usize,
        source: &[u8],
        first_vertex: u32,
        vertex_count: u32,
    ) -> Result<u32> {
        let buffer = self.entries.try_get_mut(id)?;

        let object = *buffer.objects.get(object_index).ok_or_else(|| {
            EngineError::out_of_range(format!(
                "object {object_index} of vertex buffer {id} ({} objects)",
                buffer.objects.len()
            ))
        })?;
        let attribute = *buffer.layout.attribute(attribute_index).ok_or_else(|| {
            EngineError::out_of_range(format!(
                "attribute {attribute_index} of vertex buffer {id} ({} attributes)",
                buffer.layout.attributes().len()
            ))
        })?;

        let remaining = object.vertex_count.saturating_sub(first_vertex);
        let count = vertex_count.min(remaining);
        if count < vertex_count {
            log::warn!(
                "vertex buffer {id}: write of {vertex_count} vertices at {first_vertex} \
                 clamped to {count} (object {object_index} holds {})",
                object.vertex_count
            );
        }
        if count == 0 {
            return Ok(0);
        }

        let width = attribute.width() as usize;
        let needed = width * count as usize;
        if source.len() < needed {
            return Err(EngineError::out_of_range(format!(
                "source holds {} bytes, {count} vertices of attribute {attribute_index} need {needed}",
                source.len()
            )));
        }

        let stride = buffer.stride() as usize;
        let first = (object.start_vertex + first_vertex) as usize;
        let modified = scatter_attribute(
            buffer.platform.contents_mut(),
            &source[..needed],
            stride,
            attribute.offset as usize,
            width,
            first,
        );
        backend.vertex_buffer_unmap(&mut buffer.platform, modified);

        Ok(count)
    }

    /// Maps the whole buffer for bulk writes until the guard is dropped.
    pub fn borrow<'a>(
        &'a mut self,
        backend: &'a mut B,
        id: VertexBufferId,
    ) -> Result<BorrowedData<'a, B, B::VertexBuffer>> {
        let buffer = self.entries.try_get_mut(id)?;
        Ok(BorrowedData::new(backend, &mut buffer.platform, B::vertex_buffer_unmap))
    }

    /// Replaces the object table.
    ///
    /// Objects keep the given order (it is the multi-draw order), must be
    /// non-empty, must not overlap and must fit within the buffer capacity.
    pub fn set_objects(&mut self, id: VertexBufferId, objects: &[VertexObject]) -> Result<()> {
        let buffer = self.entries.try_get_mut(id)?;
        validate_objects(objects, buffer.capacity)?;

        buffer.replace_objects(objects.to_vec());
        log::debug!("vertex buffer {id}: {} objects", objects.len());
        Ok(())
    }

    pub fn free(&mut self, backend: &mut B, id: VertexBufferId) -> Result<()> {
        let buffer = self.entries.remove(id).ok_or_else(|| id.stale())?;
        backend.vertex_buffer_free(buffer.platform);
        log::debug!("vertex buffer {id} freed");
        Ok(())
    }

    pub(crate) fn release_all(&mut self, backend: &mut B) {
        for buffer in self.entries.drain() {
            backend.vertex_buffer_free(buffer.platform);
        }
    }
}

/// Copies `src` (tightly packed, `width` bytes per vertex) into the interleaved
/// `dst`, starting at vertex `first`.
///
/// Returns the byte span that was touched.
pub(crate) fn scatter_attribute(
    dst: &mut [u8],
    src: &[u8],
    stride: usize,
    offset: usize,
    width: usize,
    first: usize,
) -> Range<usize> {
    let count = src.len() / width;
    for (i, value) in src.chunks_exact(width).enumerate() {
        let at = (first + i) * stride + offset;
        dst[at..at + width].copy_from_slice(value);
    }

    if count == 0 {
        return 0..0;
    }
    let start = first * stride + offset;
    let end = (first + count - 1) * stride + offset + width;
    start..end
}

fn validate_objects(objects: &[VertexObject], capacity: u32) -> Result<()> {
    if objects.is_empty() {
        return Err(EngineError::configuration("vertex buffer needs at least one object"));
    }

    let mut sorted: Vec<VertexObject> = objects.to_vec();
    sorted.sort_by_key(|o| o.start_vertex);

    let mut end = 0u32;
    for o in &sorted {
        let o_end = o.start_vertex.checked_add(o.vertex_count).filter(|&e| e <= capacity);
        let Some(o_end) = o_end else {
            return Err(EngineError::configuration(format!(
                "object [{}, +{}) exceeds capacity {capacity}",
                o.start_vertex, o.vertex_count
            )));
        };
        if o.start_vertex < end {
            return Err(EngineError::configuration(format!(
                "object [{}, +{}) overlaps a previous object",
                o.start_vertex, o.vertex_count
            )));
        }
        end = o_end;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::backend::headless::HeadlessBackend;
    use crate::layout::AttributeType;

    fn setup(capacity: u32) -> (HeadlessBackend, VertexBufferRegistry<HeadlessBackend>, VertexBufferId) {
        let mut backend = HeadlessBackend::new();
        let mut registry = VertexBufferRegistry::new();
        let id = registry
            .allocate(
                &mut backend,
                &[
                    AttributeDescriptor::new(AttributeType::Vec3, 0),
                    AttributeDescriptor::new(AttributeType::Vec4, 1),
                ],
                capacity,
                Topology::Triangles,
            )
            .unwrap();
        (backend, registry, id)
    }

    fn f32s(bytes: &[u8]) -> Vec<f32> {
        bytes.chunks_exact(4).map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]])).collect()
    }

    // ── scatter ────────────────────────────────────────────────────────────

    #[test]
    fn scatter_interleaves_into_stride() {
        let mut dst = [0u8; 12];
        let range = scatter_attribute(&mut dst, &[1, 2, 3, 4], 4, 2, 2, 1);
        assert_eq!(dst, [0, 0, 0, 0, 0, 0, 1, 2, 0, 0, 3, 4]);
        assert_eq!(range, 6..12);
    }

    #[test]
    fn scatter_of_nothing_touches_nothing() {
        let mut dst = [7u8; 4];
        assert_eq!(scatter_attribute(&mut dst, &[], 4, 0, 4, 0), 0..0);
        assert_eq!(dst, [7; 4]);
    }

    // ── allocation ─────────────────────────────────────────────────────────

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(1024)]
    fn default_object_spans_capacity(#[case] capacity: u32) {
        let (_, registry, id) = setup(capacity);
        let buffer = registry.get(id).unwrap();
        assert_eq!(buffer.objects(), &[VertexObject::new(0, capacity)]);
        assert_eq!(buffer.starts(), &[0]);
        assert_eq!(buffer.counts(), &[capacity]);
        assert_eq!(buffer.contents().len(), 28 * capacity as usize);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut backend = HeadlessBackend::new();
        let mut registry = VertexBufferRegistry::new();
        let err = registry
            .allocate(
                &mut backend,
                &[AttributeDescriptor::new(AttributeType::Float, 0)],
                0,
                Topology::Points,
            )
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert!(registry.is_empty());
    }

    #[test]
    fn backend_failure_propagates() {
        let mut backend = HeadlessBackend::with_memory_limit(16);
        let mut registry = VertexBufferRegistry::new();
        let err = registry
            .allocate(
                &mut backend,
                &[AttributeDescriptor::new(AttributeType::Vec4, 0)],
                2,
                Topology::Lines,
            )
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_topology_code() {
        assert_eq!(Topology::try_from(2).unwrap(), Topology::Lines);
        assert!(Topology::try_from(3).is_err());
    }

    // ── writes ─────────────────────────────────────────────────────────────

    #[test]
    fn write_places_attribute_at_offset() {
        let (mut backend, mut registry, id) = setup(2);
        let color: [f32; 8] = [1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let written = registry
            .write_attribute_data(&mut backend, id, 0, 1, bytemuck::cast_slice(&color), 0, 2)
            .unwrap();
        assert_eq!(written, 2);

        let data = f32s(registry.get(id).unwrap().contents());
        assert_eq!(&data[3..7], &[1.0, 0.0, 0.0, 1.0]);
        assert_eq!(&data[10..14], &[0.0, 1.0, 0.0, 1.0]);
        assert_eq!(&data[0..3], &[0.0; 3]);

        let uploads = backend.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].range, 12..56);
    }

    #[test]
    fn write_is_relative_to_object_start() {
        let (mut backend, mut registry, id) = setup(4);
        registry
            .set_objects(id, &[VertexObject::new(0, 2), VertexObject::new(2, 2)])
            .unwrap();

        let pos: [f32; 3] = [5.0, 6.0, 7.0];
        registry
            .write_attribute_data(&mut backend, id, 1, 0, bytemuck::cast_slice(&pos), 1, 1)
            .unwrap();

        let data = f32s(registry.get(id).unwrap().contents());
        assert_eq!(&data[21..24], &[5.0, 6.0, 7.0]);
    }

    #[test]
    fn over_long_write_clamps_to_object() {
        let (mut backend, mut registry, id) = setup(4);
        registry
            .set_objects(id, &[VertexObject::new(0, 2), VertexObject::new(2, 2)])
            .unwrap();

        let pos = [1.0f32; 9];
        let written = registry
            .write_attribute_data(&mut backend, id, 0, 0, bytemuck::cast_slice(&pos), 0, 3)
            .unwrap();
        assert_eq!(written, 2);

        let data = f32s(registry.get(id).unwrap().contents());
        assert_eq!(&data[7..10], &[1.0; 3]);
        assert_eq!(&data[14..17], &[0.0; 3]);
    }

    #[test]
    fn short_source_is_out_of_range() {
        let (mut backend, mut registry, id) = setup(3);
        let pos = [0.0f32; 3];
        let err = registry
            .write_attribute_data(&mut backend, id, 0, 0, bytemuck::cast_slice(&pos), 0, 2)
            .unwrap_err();
        assert!(matches!(err, EngineError::OutOfRange(_)));
    }

    #[rstest]
    #[case(1, 0)]
    #[case(0, 2)]
    fn bad_indices_are_out_of_range(#[case] object: usize, #[case] attribute: usize) {
        let (mut backend, mut registry, id) = setup(3);
        let err = registry
            .write_attribute_data(&mut backend, id, object, attribute, &[0; 16], 0, 1)
            .unwrap_err();
        assert!(matches!(err, EngineError::OutOfRange(_)));
    }

    // ── objects ────────────────────────────────────────────────────────────

    #[rstest]
    #[case::empty(&[])]
    #[case::overlap(&[VertexObject::new(0, 3), VertexObject::new(2, 2)])]
    #[case::past_capacity(&[VertexObject::new(4, 3)])]
    #[case::overflow(&[VertexObject::new(u32::MAX, 2)])]
    fn invalid_object_tables(#[case] objects: &[VertexObject]) {
        let (_, mut registry, id) = setup(6);
        let err = registry.set_objects(id, objects).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert_eq!(registry.get(id).unwrap().objects(), &[VertexObject::new(0, 6)]);
    }

    #[test]
    fn object_order_is_kept() {
        let (_, mut registry, id) = setup(6);
        let objects = [VertexObject::new(3, 3), VertexObject::new(0, 3)];
        registry.set_objects(id, &objects).unwrap();

        let buffer = registry.get(id).unwrap();
        assert_eq!(buffer.starts(), &[3, 0]);
        assert_eq!(buffer.counts(), &[3, 3]);
    }

    // ── lifetime ───────────────────────────────────────────────────────────

    #[test]
    fn free_invalidates_handle() {
        let (mut backend, mut registry, id) = setup(3);
        registry.free(&mut backend, id).unwrap();
        assert!(registry.get(id).is_err());
        assert!(registry.free(&mut backend, id).is_err());
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn untouched_borrow_uploads_nothing() {
        let (mut backend, mut registry, id) = setup(3);
        {
            let guard = registry.borrow(&mut backend, id).unwrap();
            assert_eq!(guard.len(), 84);
        }
        assert!(backend.uploads().is_empty());
    }
}
