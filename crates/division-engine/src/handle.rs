//! Generation-tagged handles and the arena that hands them out.
//!
//! A handle is a slot index plus the generation the slot had when the value was
//! inserted. Freeing a value bumps the slot generation, so stale handles fail
//! lookup instead of aliasing whatever reuses the slot.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

use crate::error::EngineError;

/// Entity markers used to type handles.
pub mod kind {
    pub enum VertexBuffer {}
    pub enum UniformBuffer {}
    pub enum ShaderProgram {}
    pub enum RenderPass {}
}

/// Describes a handle kind for diagnostics.
pub trait HandleKind {
    const NAME: &'static str;
}

impl HandleKind for kind::VertexBuffer {
    const NAME: &'static str = "vertex buffer";
}

impl HandleKind for kind::UniformBuffer {
    const NAME: &'static str = "uniform buffer";
}

impl HandleKind for kind::ShaderProgram {
    const NAME: &'static str = "shader program";
}

impl HandleKind for kind::RenderPass {
    const NAME: &'static str = "render pass";
}

pub type VertexBufferId = Handle<kind::VertexBuffer>;
pub type UniformBufferId = Handle<kind::UniformBuffer>;
pub type ShaderProgramId = Handle<kind::ShaderProgram>;
pub type RenderPassId = Handle<kind::RenderPass>;

/// Opaque reference to an entity owned by one `Context`.
pub struct Handle<K> {
    index: u32,
    generation: u32,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Handle<K> {
    #[inline]
    const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation, _kind: PhantomData }
    }

    /// Slot index inside the owning registry.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl<K: HandleKind> Handle<K> {
    pub(crate) fn stale(self) -> EngineError {
        EngineError::StaleHandle { kind: K::NAME, handle: self.to_string() }
    }
}

impl<K> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Handle<K> {}

impl<K> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<K> Eq for Handle<K> {}

impl<K> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<K> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle(#{}v{})", self.index, self.generation)
    }
}

impl<K> fmt::Display for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with a free list.
///
/// Insertion is amortized O(1); freed slots are recycled with a bumped generation.
pub struct Arena<K, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    _kind: PhantomData<fn() -> K>,
}

impl<K, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self { slots: Vec::new(), free: Vec::new(), len: 0, _kind: PhantomData }
    }
}

impl<K, T> Arena<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) -> Handle<K> {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, value: Some(value) });
        Handle::new(index, 0)
    }

    pub fn get(&self, handle: Handle<K>) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle<K>) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.value.as_mut())
    }

    #[inline]
    pub fn contains(&self, handle: Handle<K>) -> bool {
        self.get(handle).is_some()
    }

    pub fn remove(&mut self, handle: Handle<K>) -> Option<T> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)?;

        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Iterates live values in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<K>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value.as_ref().map(|v| (Handle::new(i as u32, s.generation), v))
        })
    }

    /// Removes every live value, yielding them in slot order.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.len = 0;
        self.free.clear();
        self.slots.drain(..).filter_map(|s| s.value)
    }
}

impl<K: HandleKind, T> Arena<K, T> {
    /// Like [`get`](Self::get) but reports a stale handle as an error.
    pub fn try_get(&self, handle: Handle<K>) -> Result<&T, EngineError> {
        self.get(handle).ok_or_else(|| handle.stale())
    }

    pub fn try_get_mut(&mut self, handle: Handle<K>) -> Result<&mut T, EngineError> {
        self.get_mut(handle).ok_or_else(|| handle.stale())
    }
}
