//! Division engine crate.
//!
//! Backend-neutral GPU resource registries (vertex buffers, uniform buffers,
//! shader programs, render passes) and a frame submission loop that replays the
//! registered passes once per tick. A `wgpu` backend renders to a window on
//! OpenGL or Metal; a headless backend records the same calls in memory.

pub mod backend;
pub mod blend;
pub mod color;
pub mod core;
pub mod error;
pub mod frame;
pub mod handle;
pub mod layout;
pub mod logging;
pub mod resources;
pub mod shader;
pub mod time;
pub mod window;

pub use crate::backend::{Backend, BorrowedData};
pub use crate::blend::{Blend, BlendFactor, BlendOperation, ColorMask};
pub use crate::color::Color;
pub use crate::core::{App, AppControl, Context};
pub use crate::error::{EngineError, ErrorKind, Result};
pub use crate::frame::FrameStats;
pub use crate::handle::{Handle, RenderPassId, ShaderProgramId, UniformBufferId, VertexBufferId};
pub use crate::layout::{AttributeDescriptor, AttributeType, ScalarType, VertexLayout};
pub use crate::resources::{DrawRange, RenderPassDescriptor, Topology, VertexObject};
pub use crate::shader::{ShaderSource, ShaderStage};
