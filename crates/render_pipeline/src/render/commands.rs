//! # Render Commands
//!
//! The linear instruction stream handed to the backend. A
//! [`RenderCommandBuffer`] is an ordered sequence of
//! [`RenderCommandList`]s and must be executed strictly in order.
//!
//! Resource commands own their payload: a load carries the creation data,
//! an unload carries the handle itself. Executing an unload and dropping it
//! is what finally releases the handle's pool slot.

use super::backend::RenderBackend;
use super::frame::RenderCamera;
use super::pass::PassLight;
use super::render_object::{MaterialId, SkinnedAnimation};
use crate::foundation::math::{Colour, Mat4, Vec3};
use crate::resources::{
    DynamicMesh, LoadCommand, Mesh, MeshId, Shader, Texture, TextureId, UnloadCommand,
};
use std::sync::Arc;

/// A single backend instruction
#[derive(Debug)]
pub enum RenderCommand {
    /// Create a mesh
    LoadMesh(LoadCommand<Mesh>),
    /// Create a texture
    LoadTexture(LoadCommand<Texture>),
    /// Create a shader program
    LoadShader(LoadCommand<Shader>),
    /// Destroy a mesh
    UnloadMesh(UnloadCommand<Mesh>),
    /// Destroy a texture
    UnloadTexture(UnloadCommand<Texture>),
    /// Destroy a shader program
    UnloadShader(UnloadCommand<Shader>),
    /// Start rendering to the screen
    Begin {
        /// Target size in pixels
        resolution: (u32, u32),
        /// Clear colour
        clear_colour: Colour,
    },
    /// Start rendering to an offscreen texture
    BeginWithTarget {
        /// Target texture
        target: TextureId,
        /// Target size in pixels
        resolution: (u32, u32),
        /// Clear colour
        clear_colour: Colour,
    },
    /// Bind camera matrices
    ApplyCamera {
        /// Camera position in world space
        position: Vec3,
        /// View matrix
        view: Mat4,
        /// Combined view-projection matrix
        view_projection: Mat4,
    },
    /// Bind the light for the following draws
    ApplyLight(PassLight),
    /// Bind a material
    ApplyMaterial(MaterialId),
    /// Bind a GPU mesh
    ApplyMesh(MeshId),
    /// Bind a joint palette for the bound mesh
    ApplySkinnedAnimation(Arc<SkinnedAnimation>),
    /// Draw the bound mesh once with a world transform
    RenderInstance {
        /// Local-to-world transform
        world: Mat4,
    },
    /// Upload and draw CPU-resident geometry
    RenderDynamicMesh {
        /// Geometry to draw
        mesh: Arc<DynamicMesh>,
        /// Local-to-world transform; identity for batches
        world: Mat4,
    },
    /// Finish the current target
    End,
}

/// Payload-free discriminant of a [`RenderCommand`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderCommandKind {
    /// [`RenderCommand::LoadMesh`]
    LoadMesh,
    /// [`RenderCommand::LoadTexture`]
    LoadTexture,
    /// [`RenderCommand::LoadShader`]
    LoadShader,
    /// [`RenderCommand::UnloadMesh`]
    UnloadMesh,
    /// [`RenderCommand::UnloadTexture`]
    UnloadTexture,
    /// [`RenderCommand::UnloadShader`]
    UnloadShader,
    /// [`RenderCommand::Begin`]
    Begin,
    /// [`RenderCommand::BeginWithTarget`]
    BeginWithTarget,
    /// [`RenderCommand::ApplyCamera`]
    ApplyCamera,
    /// [`RenderCommand::ApplyLight`]
    ApplyLight,
    /// [`RenderCommand::ApplyMaterial`]
    ApplyMaterial,
    /// [`RenderCommand::ApplyMesh`]
    ApplyMesh,
    /// [`RenderCommand::ApplySkinnedAnimation`]
    ApplySkinnedAnimation,
    /// [`RenderCommand::RenderInstance`]
    RenderInstance,
    /// [`RenderCommand::RenderDynamicMesh`]
    RenderDynamicMesh,
    /// [`RenderCommand::End`]
    End,
}

impl RenderCommand {
    /// Camera binding for `camera`
    pub fn apply_camera(camera: &RenderCamera) -> Self {
        Self::ApplyCamera {
            position: camera.position(),
            view: *camera.view(),
            view_projection: camera.view_projection(),
        }
    }

    /// Discriminant of the command
    pub const fn kind(&self) -> RenderCommandKind {
        match self {
            Self::LoadMesh(_) => RenderCommandKind::LoadMesh,
            Self::LoadTexture(_) => RenderCommandKind::LoadTexture,
            Self::LoadShader(_) => RenderCommandKind::LoadShader,
            Self::UnloadMesh(_) => RenderCommandKind::UnloadMesh,
            Self::UnloadTexture(_) => RenderCommandKind::UnloadTexture,
            Self::UnloadShader(_) => RenderCommandKind::UnloadShader,
            Self::Begin { .. } => RenderCommandKind::Begin,
            Self::BeginWithTarget { .. } => RenderCommandKind::BeginWithTarget,
            Self::ApplyCamera { .. } => RenderCommandKind::ApplyCamera,
            Self::ApplyLight(_) => RenderCommandKind::ApplyLight,
            Self::ApplyMaterial(_) => RenderCommandKind::ApplyMaterial,
            Self::ApplyMesh(_) => RenderCommandKind::ApplyMesh,
            Self::ApplySkinnedAnimation(_) => RenderCommandKind::ApplySkinnedAnimation,
            Self::RenderInstance { .. } => RenderCommandKind::RenderInstance,
            Self::RenderDynamicMesh { .. } => RenderCommandKind::RenderDynamicMesh,
            Self::End => RenderCommandKind::End,
        }
    }

    /// Whether this is a load or unload
    pub const fn is_resource_command(&self) -> bool {
        matches!(
            self,
            Self::LoadMesh(_)
                | Self::LoadTexture(_)
                | Self::LoadShader(_)
                | Self::UnloadMesh(_)
                | Self::UnloadTexture(_)
                | Self::UnloadShader(_)
        )
    }
}

/// Ordered run of commands
#[derive(Debug, Default)]
pub struct RenderCommandList {
    commands: Vec<RenderCommand>,
}

impl RenderCommandList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command
    pub fn push(&mut self, command: RenderCommand) {
        self.commands.push(command);
    }

    /// Commands in order
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop every command, keeping the allocation
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Drop every command that is not a load or unload
    pub fn retain_resource_commands(&mut self) {
        self.commands.retain(RenderCommand::is_resource_command);
    }
}

impl Extend<RenderCommand> for RenderCommandList {
    fn extend<I: IntoIterator<Item = RenderCommand>>(&mut self, iter: I) {
        self.commands.extend(iter);
    }
}

impl IntoIterator for RenderCommandList {
    type Item = RenderCommand;
    type IntoIter = std::vec::IntoIter<RenderCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

impl From<Vec<RenderCommand>> for RenderCommandList {
    fn from(commands: Vec<RenderCommand>) -> Self {
        Self { commands }
    }
}

/// Most emptied lists a buffer keeps for reuse
const MAX_SPARE_LISTS: usize = 256;

/// One frame's worth of command lists, ready for the backend
///
/// Executing a buffer in place empties its lists but keeps their storage,
/// so a recycled buffer can hand the same allocations to the next frame
/// through [`Self::take_list`].
#[derive(Debug, Default)]
pub struct RenderCommandBuffer {
    lists: Vec<RenderCommandList>,
    spare: Vec<RenderCommandList>,
    frame_index: u64,
}

impl RenderCommandBuffer {
    /// Create an empty buffer for frame `frame_index`
    pub fn new(frame_index: u64) -> Self {
        Self {
            lists: Vec::new(),
            spare: Vec::new(),
            frame_index,
        }
    }

    /// Empty the buffer for reuse as frame `frame_index`
    ///
    /// Lists still holding commands are cleared and kept as spares.
    pub fn reset(&mut self, frame_index: u64) {
        self.frame_index = frame_index;
        for mut list in self.lists.drain(..) {
            list.clear();
            if self.spare.len() < MAX_SPARE_LISTS {
                self.spare.push(list);
            }
        }
    }

    /// An empty list, reusing spare storage when there is any
    pub fn take_list(&mut self) -> RenderCommandList {
        self.spare.pop().unwrap_or_default()
    }

    /// Number of emptied lists waiting to be reused
    pub fn spare_list_count(&self) -> usize {
        self.spare.len()
    }

    /// Frame this buffer was compiled for
    pub const fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Append a list; empty lists are kept as spares instead
    pub fn push_list(&mut self, list: RenderCommandList) {
        if !list.is_empty() {
            self.lists.push(list);
        } else if self.spare.len() < MAX_SPARE_LISTS {
            self.spare.push(list);
        }
    }

    /// Lists in execution order
    pub fn lists(&self) -> &[RenderCommandList] {
        &self.lists
    }

    /// Every command in execution order
    pub fn iter(&self) -> impl Iterator<Item = &RenderCommand> {
        self.lists.iter().flat_map(|list| list.commands().iter())
    }

    /// Total number of commands
    pub fn command_count(&self) -> usize {
        self.lists.iter().map(RenderCommandList::len).sum()
    }

    /// Strip all drawing, keeping resource commands so handle lifecycles
    /// still complete while rendering is suspended
    pub fn retain_resource_commands(&mut self) {
        for list in &mut self.lists {
            list.retain_resource_commands();
        }
        self.lists.retain(|list| !list.is_empty());
    }

    /// Execute every command in order, consuming the buffer
    ///
    /// Backend failures are logged and never stop the frame. A failed load
    /// marks its handle failed; unload commands release their handles as soon
    /// as the backend has seen them.
    pub fn execute(mut self, backend: &mut dyn RenderBackend) {
        self.execute_in_place(backend);
    }

    /// Execute every command in order, leaving the buffer empty for reuse
    ///
    /// Same semantics as [`Self::execute`]; the emptied lists become spares.
    pub fn execute_in_place(&mut self, backend: &mut dyn RenderBackend) {
        log::trace!(
            "Executing frame {} ({} commands)",
            self.frame_index,
            self.command_count()
        );

        for list in &mut self.lists {
            for command in list.commands.drain(..) {
                execute_command(command, backend);
            }
        }
        self.reset(self.frame_index);
    }
}

fn execute_command(command: RenderCommand, backend: &mut dyn RenderBackend) {
    match command {
        RenderCommand::LoadMesh(load) => load.complete(backend.load_mesh(&load)),
        RenderCommand::LoadTexture(load) => load.complete(backend.load_texture(&load)),
        RenderCommand::LoadShader(load) => load.complete(backend.load_shader(&load)),
        RenderCommand::UnloadMesh(unload) => {
            if let Err(error) = backend.unload_mesh(&unload) {
                log::error!("Failed to unload {:?}: {error}", unload.id());
            }
        }
        RenderCommand::UnloadTexture(unload) => {
            if let Err(error) = backend.unload_texture(&unload) {
                log::error!("Failed to unload {:?}: {error}", unload.id());
            }
        }
        RenderCommand::UnloadShader(unload) => {
            if let Err(error) = backend.unload_shader(&unload) {
                log::error!("Failed to unload {:?}: {error}", unload.id());
            }
        }
        draw => {
            if let Err(error) = backend.execute(&draw) {
                log::error!("Backend failed on {:?}: {error}", draw.kind());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_skips_empty_lists() {
        let mut buffer = RenderCommandBuffer::new(7);
        buffer.push_list(RenderCommandList::new());
        buffer.push_list(RenderCommandList::from(vec![RenderCommand::End]));
        assert_eq!(buffer.lists().len(), 1);
        assert_eq!(buffer.command_count(), 1);
        assert_eq!(buffer.frame_index(), 7);
    }

    #[test]
    fn test_retain_resource_commands_drops_draws() {
        let mut buffer = RenderCommandBuffer::new(0);
        buffer.push_list(RenderCommandList::from(vec![
            RenderCommand::Begin {
                resolution: (1, 1),
                clear_colour: Colour::zeros(),
            },
            RenderCommand::End,
        ]));
        buffer.retain_resource_commands();
        assert_eq!(buffer.command_count(), 0);
        assert!(buffer.lists().is_empty());
    }

    #[test]
    fn test_execute_in_place_keeps_lists_for_reuse() {
        let mut backend = crate::render::backend::HeadlessBackend::new();
        let mut buffer = RenderCommandBuffer::new(3);
        let mut list = buffer.take_list();
        list.push(RenderCommand::Begin {
            resolution: (1, 1),
            clear_colour: Colour::zeros(),
        });
        list.push(RenderCommand::End);
        buffer.push_list(list);

        buffer.execute_in_place(&mut backend);
        assert_eq!(backend.stats().targets, 1);
        assert_eq!(buffer.command_count(), 0);
        assert_eq!(buffer.spare_list_count(), 1);

        buffer.reset(4);
        assert_eq!(buffer.frame_index(), 4);
        let reused = buffer.take_list();
        assert!(reused.is_empty());
        assert_eq!(buffer.spare_list_count(), 0);
    }
}
