//! # Render Backend Abstraction
//!
//! The seam between the command stream and a graphics API. The pipeline never
//! talks to a device directly; it compiles [`RenderCommandBuffer`]s and the
//! backend thread replays them through this trait.
//!
//! ## Architecture
//!
//! - **Resource commands**: dedicated methods, so the load result can be
//!   written back onto the handle and the unload can release it
//! - **Everything else**: one `execute` entry point taking the command
//!
//! [`HeadlessBackend`] implements the trait without a device. It records what
//! it was asked to do, which is what the tests and the demo run against.
//!
//! [`RenderCommandBuffer`]: super::RenderCommandBuffer

use super::commands::{RenderCommand, RenderCommandKind};
use super::{BackendResult, RenderError};
use crate::resources::{BackendData, LoadCommand, Mesh, Shader, Texture, UnloadCommand};

/// # Render Backend Trait
///
/// Implemented by graphics backends. All methods run on the backend thread,
/// in command buffer order.
///
/// ## Implementation Notes
///
/// Backends should:
/// - Return an opaque value from each load; it is stored on the handle and
///   handed back with the matching unload
/// - Treat every error as recoverable; the frame continues after it is logged
pub trait RenderBackend {
    /// Create a mesh from the command's vertex and index data
    ///
    /// # Returns
    /// Backend data identifying the created mesh
    fn load_mesh(&mut self, command: &LoadCommand<Mesh>) -> BackendResult<BackendData>;

    /// Create a texture
    fn load_texture(&mut self, command: &LoadCommand<Texture>) -> BackendResult<BackendData>;

    /// Compile and link a shader program
    fn load_shader(&mut self, command: &LoadCommand<Shader>) -> BackendResult<BackendData>;

    /// Destroy a mesh
    fn unload_mesh(&mut self, command: &UnloadCommand<Mesh>) -> BackendResult<()>;

    /// Destroy a texture
    fn unload_texture(&mut self, command: &UnloadCommand<Texture>) -> BackendResult<()>;

    /// Destroy a shader program
    fn unload_shader(&mut self, command: &UnloadCommand<Shader>) -> BackendResult<()>;

    /// Execute a target, state or draw command
    fn execute(&mut self, command: &RenderCommand) -> BackendResult<()>;
}

/// Counters kept by [`HeadlessBackend`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Successful loads of any resource type
    pub loads: usize,
    /// Loads that returned an error
    pub failed_loads: usize,
    /// Unloads of any resource type
    pub unloads: usize,
    /// Targets begun
    pub targets: usize,
    /// Instance and dynamic mesh draws
    pub draws: usize,
    /// Vertices submitted through dynamic mesh draws
    pub dynamic_vertices: usize,
}

/// Device-less backend that records every command it executes
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    executed: Vec<RenderCommandKind>,
    stats: BackendStats,
    next_backend_data: BackendData,
    fail_mesh_loads: bool,
}

impl HeadlessBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent mesh load fail
    pub fn set_fail_mesh_loads(&mut self, fail: bool) {
        self.fail_mesh_loads = fail;
    }

    /// Kinds of every command executed so far, in order
    pub fn executed(&self) -> &[RenderCommandKind] {
        &self.executed
    }

    /// How many commands of `kind` were executed
    pub fn count(&self, kind: RenderCommandKind) -> usize {
        self.executed.iter().filter(|&&executed| executed == kind).count()
    }

    /// Counters accumulated so far
    pub const fn stats(&self) -> BackendStats {
        self.stats
    }

    /// Forget recorded commands, keeping the counters
    pub fn clear_executed(&mut self) {
        self.executed.clear();
    }

    fn next_data(&mut self) -> BackendData {
        self.next_backend_data += 1;
        self.next_backend_data
    }

    fn record_load(&mut self, kind: RenderCommandKind) -> BackendData {
        self.executed.push(kind);
        self.stats.loads += 1;
        self.next_data()
    }

    fn record_unload(&mut self, kind: RenderCommandKind, backend_data: BackendData) {
        self.executed.push(kind);
        self.stats.unloads += 1;
        log::trace!("Headless unload of backend object {backend_data}");
    }
}

impl RenderBackend for HeadlessBackend {
    fn load_mesh(&mut self, command: &LoadCommand<Mesh>) -> BackendResult<BackendData> {
        if self.fail_mesh_loads {
            self.executed.push(RenderCommandKind::LoadMesh);
            self.stats.failed_loads += 1;
            return Err(RenderError::ResourceCreationFailed(format!(
                "headless mesh load of {:?} disabled",
                command.id()
            )));
        }

        let (desc, data) = (command.desc(), command.data());
        if data.vertices.len() % desc.vertex_format.stride() != 0
            || data.indices.len() % desc.index_format.size() != 0
        {
            self.stats.failed_loads += 1;
            return Err(RenderError::ResourceCreationFailed(format!(
                "{:?} buffers do not match its vertex or index format",
                command.id()
            )));
        }

        Ok(self.record_load(RenderCommandKind::LoadMesh))
    }

    fn load_texture(&mut self, command: &LoadCommand<Texture>) -> BackendResult<BackendData> {
        let desc = command.desc();
        if let Some(pixels) = &command.data().pixels {
            if pixels.len() != desc.byte_size() {
                self.stats.failed_loads += 1;
                return Err(RenderError::ResourceCreationFailed(format!(
                    "{:?} expects {} bytes of pixels, got {}",
                    command.id(),
                    desc.byte_size(),
                    pixels.len()
                )));
            }
        }
        Ok(self.record_load(RenderCommandKind::LoadTexture))
    }

    fn load_shader(&mut self, command: &LoadCommand<Shader>) -> BackendResult<BackendData> {
        let data = command.data();
        if data.vertex_source.is_empty() || data.fragment_source.is_empty() {
            self.stats.failed_loads += 1;
            return Err(RenderError::ResourceCreationFailed(format!(
                "shader '{}' has an empty stage",
                command.desc().name
            )));
        }
        Ok(self.record_load(RenderCommandKind::LoadShader))
    }

    fn unload_mesh(&mut self, command: &UnloadCommand<Mesh>) -> BackendResult<()> {
        self.record_unload(RenderCommandKind::UnloadMesh, command.backend_data());
        Ok(())
    }

    fn unload_texture(&mut self, command: &UnloadCommand<Texture>) -> BackendResult<()> {
        self.record_unload(RenderCommandKind::UnloadTexture, command.backend_data());
        Ok(())
    }

    fn unload_shader(&mut self, command: &UnloadCommand<Shader>) -> BackendResult<()> {
        self.record_unload(RenderCommandKind::UnloadShader, command.backend_data());
        Ok(())
    }

    fn execute(&mut self, command: &RenderCommand) -> BackendResult<()> {
        match command {
            RenderCommand::Begin { .. } | RenderCommand::BeginWithTarget { .. } => {
                self.stats.targets += 1;
            }
            RenderCommand::RenderInstance { .. } => self.stats.draws += 1,
            RenderCommand::RenderDynamicMesh { mesh, .. } => {
                self.stats.draws += 1;
                self.stats.dynamic_vertices += mesh.vertex_count();
            }
            _ => {}
        }
        self.executed.push(command.kind());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::commands::{RenderCommandBuffer, RenderCommandList};
    use crate::resources::{MeshData, MeshDesc, ResourceManager, ResourceState};

    #[test]
    fn test_headless_backend_counts_and_completes_loads() {
        let meshes: ResourceManager<Mesh> = ResourceManager::new(2);
        let mesh = meshes.create(MeshDesc::default(), MeshData::default());
        let (loads, _) = meshes.take_pending();

        let mut buffer = RenderCommandBuffer::new(0);
        let mut list = RenderCommandList::new();
        list.extend(loads.into_iter().map(RenderCommand::LoadMesh));
        buffer.push_list(list);

        let mut backend = HeadlessBackend::new();
        buffer.execute(&mut backend);

        assert_eq!(backend.stats().loads, 1);
        assert_eq!(backend.count(RenderCommandKind::LoadMesh), 1);
        assert_eq!(meshes.state(mesh.id()), ResourceState::Loaded);
        assert_eq!(meshes.backend_data(mesh.id()), Some(1));

        meshes.destroy(mesh);
    }

    #[test]
    fn test_failed_mesh_load_marks_handle_failed() {
        let meshes: ResourceManager<Mesh> = ResourceManager::new(2);
        let mesh = meshes.create(MeshDesc::default(), MeshData::default());
        let (loads, _) = meshes.take_pending();

        let mut backend = HeadlessBackend::new();
        backend.set_fail_mesh_loads(true);
        for load in loads {
            load.complete(backend.load_mesh(&load));
        }

        assert_eq!(meshes.state(mesh.id()), ResourceState::Failed);
        assert_eq!(backend.stats().failed_loads, 1);
        meshes.destroy(mesh);
    }
}
