use crate::error::{EngineError, Result};
use crate::layout::ScalarType;

use super::{ShaderSource, ShaderStage};

/// A `var<uniform>` declaration found in a linked program.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UniformReflection {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    /// Byte size of the declared type, trailing padding included.
    pub size: u32,
}

/// A `@location` input of the vertex entry point.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VertexInput {
    pub name: String,
    pub location: u32,
    /// `None` for component types no attribute can feed (`u32`, `f16`, ...).
    pub scalar: Option<ScalarType>,
}

/// Name → location tables extracted at link time.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ShaderReflection {
    vertex_inputs: Vec<VertexInput>,
    uniforms: Vec<UniformReflection>,
}

impl ShaderReflection {
    /// Vertex-input location of the attribute called `name`.
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.vertex_inputs.iter().find(|i| i.name == name).map(|i| i.location)
    }

    /// Binding slot of the uniform called `name`.
    pub fn uniform_location(&self, name: &str) -> Option<u32> {
        self.uniform(name).map(|u| u.binding)
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformReflection> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    pub fn uniforms(&self) -> &[UniformReflection] {
        &self.uniforms
    }

    pub fn vertex_inputs(&self) -> &[VertexInput] {
        &self.vertex_inputs
    }
}

/// A validated stage ready for backend module creation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CompiledStage {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub source: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CompiledProgram {
    pub stages: Vec<CompiledStage>,
    pub reflection: ShaderReflection,
}

impl CompiledProgram {
    pub fn stage(&self, stage: ShaderStage) -> Option<&CompiledStage> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

/// Parses, validates and links a set of sources.
///
/// A program needs exactly one vertex stage and at most one fragment stage.
/// Failures are reported as backend errors carrying the diagnostic text.
pub fn compile(sources: &[ShaderSource]) -> Result<CompiledProgram> {
    let count = |stage| sources.iter().filter(|s| s.stage == stage).count();
    if count(ShaderStage::Vertex) != 1 {
        return Err(EngineError::backend("program link requires exactly one vertex stage"));
    }
    if count(ShaderStage::Fragment) > 1 {
        return Err(EngineError::backend("program link allows at most one fragment stage"));
    }

    let mut reflection = ShaderReflection::default();
    let mut stages = Vec::with_capacity(sources.len());

    for src in sources {
        let module = naga::front::wgsl::parse_str(&src.source).map_err(|e| {
            EngineError::backend(format!(
                "failed to compile {:?} shader: {}",
                src.stage,
                e.emit_to_string(&src.source)
            ))
        })?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator.validate(&module).map_err(|e| {
            EngineError::backend(format!(
                "failed to validate {:?} shader: {}",
                src.stage,
                e.as_inner()
            ))
        })?;

        let naga_stage = match src.stage {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        };
        let entry = module
            .entry_points
            .iter()
            .find(|ep| ep.name == src.entry_point && ep.stage == naga_stage)
            .ok_or_else(|| {
                EngineError::backend(format!(
                    "entry point '{}' not found for {:?} stage",
                    src.entry_point, src.stage
                ))
            })?;

        if src.stage == ShaderStage::Vertex {
            collect_vertex_inputs(&module, entry, &mut reflection.vertex_inputs);
        }
        collect_uniforms(&module, &mut reflection.uniforms);

        stages.push(CompiledStage {
            stage: src.stage,
            entry_point: src.entry_point.clone(),
            source: src.source.clone(),
        });
    }

    Ok(CompiledProgram { stages, reflection })
}

fn collect_vertex_inputs(module: &naga::Module, entry: &naga::EntryPoint, out: &mut Vec<VertexInput>) {
    let input = |name: &Option<String>, location: u32, ty: naga::Handle<naga::Type>| VertexInput {
        name: name.clone().unwrap_or_default(),
        location,
        scalar: input_scalar(&module.types[ty].inner),
    };

    for arg in &entry.function.arguments {
        match (&arg.binding, &module.types[arg.ty].inner) {
            (Some(naga::Binding::Location { location, .. }), _) => {
                out.push(input(&arg.name, *location, arg.ty));
            }
            (None, naga::TypeInner::Struct { members, .. }) => {
                for m in members {
                    if let Some(naga::Binding::Location { location, .. }) = &m.binding {
                        out.push(input(&m.name, *location, m.ty));
                    }
                }
            }
            _ => {}
        }
    }
}

fn input_scalar(inner: &naga::TypeInner) -> Option<ScalarType> {
    let scalar = match *inner {
        naga::TypeInner::Scalar(scalar) | naga::TypeInner::Vector { scalar, .. } => scalar,
        _ => return None,
    };
    match (scalar.kind, scalar.width) {
        (naga::ScalarKind::Float, 4) => Some(ScalarType::Float32),
        (naga::ScalarKind::Float, 8) => Some(ScalarType::Float64),
        (naga::ScalarKind::Sint, 4) => Some(ScalarType::Sint32),
        _ => None,
    }
}

fn collect_uniforms(module: &naga::Module, out: &mut Vec<UniformReflection>) {
    for (_, var) in module.global_variables.iter() {
        if var.space != naga::AddressSpace::Uniform {
            continue;
        }
        let Some(rb) = &var.binding else { continue };

        let u = UniformReflection {
            name: var.name.clone().unwrap_or_default(),
            group: rb.group,
            binding: rb.binding,
            size: module.types[var.ty].inner.size(module.to_ctx()),
        };
        if !out.contains(&u) {
            out.push(u);
        }
    }
}
