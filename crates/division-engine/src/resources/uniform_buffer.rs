use crate::backend::{Backend, BorrowedData, PlatformBuffer};
use crate::error::{EngineError, Result};
use crate::handle::{Arena, UniformBufferId, kind};
use crate::shader::ShaderStage;

/// Size and binding of a uniform buffer; fixed for the buffer's lifetime.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniformBufferDescriptor {
    pub data_bytes: usize,
    pub binding: u32,
    pub stage: ShaderStage,
}

impl UniformBufferDescriptor {
    pub const fn new(data_bytes: usize, binding: u32, stage: ShaderStage) -> Self {
        Self { data_bytes, binding, stage }
    }
}

pub struct UniformBuffer<B: Backend> {
    descriptor: UniformBufferDescriptor,
    platform: B::UniformBuffer,
}

impl<B: Backend> UniformBuffer<B> {
    pub fn descriptor(&self) -> &UniformBufferDescriptor {
        &self.descriptor
    }

    pub fn data_bytes(&self) -> usize {
        self.descriptor.data_bytes
    }

    pub fn binding(&self) -> u32 {
        self.descriptor.binding
    }

    pub fn stage(&self) -> ShaderStage {
        self.descriptor.stage
    }

    pub fn platform(&self) -> &B::UniformBuffer {
        &self.platform
    }

    pub fn contents(&self) -> &[u8] {
        self.platform.contents()
    }
}

pub struct UniformBufferRegistry<B: Backend> {
    entries: Arena<kind::UniformBuffer, UniformBuffer<B>>,
}

impl<B: Backend> Default for UniformBufferRegistry<B> {
    fn default() -> Self {
        Self { entries: Arena::new() }
    }
}

impl<B: Backend> UniformBufferRegistry<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: UniformBufferId) -> bool {
        self.entries.contains(id)
    }

    pub fn get(&self, id: UniformBufferId) -> Result<&UniformBuffer<B>> {
        self.entries.try_get(id)
    }

    pub fn allocate(
        &mut self,
        backend: &mut B,
        descriptor: UniformBufferDescriptor,
    ) -> Result<UniformBufferId> {
        if descriptor.data_bytes == 0 {
            return Err(EngineError::configuration("uniform buffer size must be non-zero"));
        }

        let platform = backend.uniform_buffer_alloc(descriptor.data_bytes)?;
        let id = self.entries.insert(UniformBuffer { descriptor, platform });
        log::debug!(
            "uniform buffer {id} allocated: {} bytes at binding {} ({:?})",
            descriptor.data_bytes,
            descriptor.binding,
            descriptor.stage
        );
        Ok(id)
    }

    /// Maps the whole buffer until the guard is dropped.
    pub fn borrow<'a>(
        &'a mut self,
        backend: &'a mut B,
        id: UniformBufferId,
    ) -> Result<BorrowedData<'a, B, B::UniformBuffer>> {
        let buffer = self.entries.try_get_mut(id)?;
        Ok(BorrowedData::new(backend, &mut buffer.platform, B::uniform_buffer_unmap))
    }

    pub fn free(&mut self, backend: &mut B, id: UniformBufferId) -> Result<()> {
        let buffer = self.entries.remove(id).ok_or_else(|| id.stale())?;
        backend.uniform_buffer_free(buffer.platform);
        log::debug!("uniform buffer {id} freed");
        Ok(())
    }

    pub(crate) fn release_all(&mut self, backend: &mut B) {
        for buffer in self.entries.drain() {
            backend.uniform_buffer_free(buffer.platform);
        }
    }
}
