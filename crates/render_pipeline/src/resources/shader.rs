//! Shader resources

use super::{Handle, Resource, ResourceId};

/// Shader resource marker
#[derive(Debug)]
pub enum Shader {}

impl Resource for Shader {
    type Desc = ShaderDesc;
    type Data = ShaderData;
    const NAME: &'static str = "shader";
}

/// Reference to a GPU shader program
pub type ShaderId = ResourceId<Shader>;

/// Owning shader handle
pub type RenderShader = Handle<Shader>;

/// Immutable description of a shader program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderDesc {
    /// Name used in logs and by the backend's program cache
    pub name: String,
}

impl ShaderDesc {
    /// Describe a shader by name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Stage sources handed to the backend, which compiles them
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderData {
    /// Vertex stage source
    pub vertex_source: String,
    /// Fragment stage source
    pub fragment_source: String,
}

impl ShaderData {
    /// Bundle both stage sources
    pub fn new(vertex_source: impl Into<String>, fragment_source: impl Into<String>) -> Self {
        Self {
            vertex_source: vertex_source.into(),
            fragment_source: fragment_source.into(),
        }
    }
}
