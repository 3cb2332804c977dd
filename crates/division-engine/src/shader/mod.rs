//! Shader sources, stages and link-time reflection.
//!
//! Sources are WGSL. Linking parses and validates each source with `naga` and
//! extracts the vertex-input and uniform tables used for location queries.

mod reflect;

pub use reflect::{
    compile, CompiledProgram, CompiledStage, ShaderReflection, UniformReflection, VertexInput,
};

use crate::error::EngineError;

/// Pipeline stage a shader source or uniform buffer belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 2] = [ShaderStage::Vertex, ShaderStage::Fragment];

    /// Bind group index uniforms of this stage are bound into.
    #[inline]
    pub const fn bind_group(self) -> u32 {
        match self {
            Self::Vertex => 0,
            Self::Fragment => 1,
        }
    }
}

impl TryFrom<i32> for ShaderStage {
    type Error = EngineError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Vertex),
            1 => Ok(Self::Fragment),
            other => Err(EngineError::configuration(format!("unknown shader stage {other}"))),
        }
    }
}

/// One stage of a shader program.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ShaderSource {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub source: String,
}

impl ShaderSource {
    pub fn new(stage: ShaderStage, entry_point: impl Into<String>, source: impl Into<String>) -> Self {
        Self { stage, entry_point: entry_point.into(), source: source.into() }
    }

    pub fn vertex(entry_point: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(ShaderStage::Vertex, entry_point, source)
    }

    pub fn fragment(entry_point: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(ShaderStage::Fragment, entry_point, source)
    }
}
