use crate::backend::Backend;
use crate::error::{EngineError, Result};
use crate::handle::{Arena, ShaderProgramId, kind};
use crate::shader::{self, ShaderReflection, ShaderSource};

enum ProgramState<P> {
    /// Collecting sources; not drawable yet.
    Pending(Vec<ShaderSource>),
    Linked { platform: P, reflection: ShaderReflection },
}

pub struct ShaderProgramRegistry<B: Backend> {
    entries: Arena<kind::ShaderProgram, ProgramState<B::Program>>,
}

impl<B: Backend> Default for ShaderProgramRegistry<B> {
    fn default() -> Self {
        Self { entries: Arena::new() }
    }
}

impl<B: Backend> ShaderProgramRegistry<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: ShaderProgramId) -> bool {
        self.entries.contains(id)
    }

    /// Reserves an unlinked program.
    pub fn create(&mut self) -> ShaderProgramId {
        let id = self.entries.insert(ProgramState::Pending(Vec::new()));
        log::debug!("shader program {id} created");
        id
    }

    pub fn attach(&mut self, id: ShaderProgramId, source: ShaderSource) -> Result<()> {
        match self.entries.try_get_mut(id)? {
            ProgramState::Pending(sources) => {
                sources.push(source);
                Ok(())
            }
            ProgramState::Linked { .. } => Err(EngineError::AlreadyLinked(id.to_string())),
        }
    }

    /// Compiles and links the attached sources.
    ///
    /// On failure the program stays unlinked with its sources attached.
    pub fn link(&mut self, backend: &mut B, id: ShaderProgramId) -> Result<()> {
        let state = self.entries.try_get_mut(id)?;
        let ProgramState::Pending(sources) = &*state else {
            return Err(EngineError::AlreadyLinked(id.to_string()));
        };

        let compiled = shader::compile(sources)?;
        let platform = backend.program_link(&compiled)?;

        log::debug!(
            "shader program {id} linked: {} stages, {} uniforms",
            compiled.stages.len(),
            compiled.reflection.uniforms().len()
        );
        *state = ProgramState::Linked { platform, reflection: compiled.reflection };
        Ok(())
    }

    /// Creates, attaches and links in one step. Nothing is kept on failure.
    pub fn create_linked(&mut self, backend: &mut B, sources: &[ShaderSource]) -> Result<ShaderProgramId> {
        let id = self.entries.insert(ProgramState::Pending(sources.to_vec()));
        if let Err(e) = self.link(backend, id) {
            self.entries.remove(id);
            return Err(e);
        }
        Ok(id)
    }

    pub fn is_linked(&self, id: ShaderProgramId) -> bool {
        matches!(self.entries.get(id), Some(ProgramState::Linked { .. }))
    }

    /// Platform record and reflection of a linked program.
    pub fn linked(&self, id: ShaderProgramId) -> Result<(&B::Program, &ShaderReflection)> {
        match self.entries.try_get(id)? {
            ProgramState::Linked { platform, reflection } => Ok((platform, reflection)),
            ProgramState::Pending(_) => Err(EngineError::NotLinked(id.to_string())),
        }
    }

    pub fn reflection(&self, id: ShaderProgramId) -> Result<&ShaderReflection> {
        self.linked(id).map(|(_, reflection)| reflection)
    }

    /// Vertex-input location of attribute `name`, if the program declares it.
    pub fn attribute_location(&self, id: ShaderProgramId, name: &str) -> Result<Option<u32>> {
        Ok(self.reflection(id)?.attribute_location(name))
    }

    /// Binding slot of uniform `name`, if the program declares it.
    pub fn uniform_location(&self, id: ShaderProgramId, name: &str) -> Result<Option<u32>> {
        Ok(self.reflection(id)?.uniform_location(name))
    }

    pub fn free(&mut self, backend: &mut B, id: ShaderProgramId) -> Result<()> {
        let state = self.entries.remove(id).ok_or_else(|| id.stale())?;
        if let ProgramState::Linked { platform, .. } = state {
            backend.program_free(platform);
        }
        log::debug!("shader program {id} freed");
        Ok(())
    }

    pub(crate) fn release_all(&mut self, backend: &mut B) {
        for state in self.entries.drain() {
            if let ProgramState::Linked { platform, .. } = state {
                backend.program_free(platform);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessBackend;

    const SHADER: &str = r#"
@group(1) @binding(0) var<uniform> tint: vec4<f32>;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return tint;
}
"#;

    fn sources() -> [ShaderSource; 2] {
        [ShaderSource::vertex("vs_main", SHADER), ShaderSource::fragment("fs_main", SHADER)]
    }

    #[test]
    fn create_attach_link() {
        let mut backend = HeadlessBackend::new();
        let mut registry = ShaderProgramRegistry::new();

        let id = registry.create();
        for s in sources() {
            registry.attach(id, s).unwrap();
        }
        assert!(!registry.is_linked(id));
        assert!(matches!(registry.attribute_location(id, "position"), Err(EngineError::NotLinked(_))));

        registry.link(&mut backend, id).unwrap();
        assert!(registry.is_linked(id));
        assert_eq!(registry.attribute_location(id, "position").unwrap(), Some(0));
        assert_eq!(registry.uniform_location(id, "tint").unwrap(), Some(0));
        assert_eq!(registry.linked(id).unwrap().0.stage_count(), 2);

        let err = registry.attach(id, ShaderSource::vertex("vs_main", SHADER)).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyLinked(_)));
    }

    #[test]
    fn failed_link_keeps_program_pending() {
        let mut backend = HeadlessBackend::new();
        let mut registry = ShaderProgramRegistry::new();

        let id = registry.create();
        registry.attach(id, ShaderSource::fragment("fs_main", SHADER)).unwrap();
        assert!(registry.link(&mut backend, id).is_err());
        assert!(!registry.is_linked(id));

        registry.attach(id, ShaderSource::vertex("vs_main", SHADER)).unwrap();
        registry.link(&mut backend, id).unwrap();
        assert!(registry.is_linked(id));
    }

    #[test]
    fn create_linked_discards_on_failure() {
        let mut backend = HeadlessBackend::new();
        let mut registry = ShaderProgramRegistry::new();

        let err = registry
            .create_linked(&mut backend, &[ShaderSource::vertex("vs_main", "not wgsl")])
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Backend);
        assert!(registry.is_empty());
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn free_releases_platform_program() {
        let mut backend = HeadlessBackend::new();
        let mut registry = ShaderProgramRegistry::new();

        let id = registry.create_linked(&mut backend, &sources()).unwrap();
        assert_eq!(backend.live_objects(), 1);

        registry.free(&mut backend, id).unwrap();
        assert_eq!(backend.live_objects(), 0);
        assert!(matches!(registry.linked(id), Err(EngineError::StaleHandle { .. })));
    }
}
