//! # Resource Handles
//!
//! GPU-backed resources (meshes, textures, shaders) are represented on the
//! game side by small handles allocated from fixed-capacity pools. A handle
//! is usable as soon as `create` returns; the backend fills in its opaque
//! data later, when the queued load command executes.
//!
//! ## Lifecycle
//!
//! ```text
//! create -> Pending -> Loaded | Failed -> UnloadQueued -> released
//! ```
//!
//! `destroy` moves the owning [`Handle`] into an unload command. The pool
//! slot is released when that command is dropped, which only happens after
//! the backend has executed it.

pub mod manager;
pub mod mesh;
pub mod shader;
pub mod texture;

pub use manager::{LoadCommand, ResourceManager, ResourceManagers, ResourceView, UnloadCommand};
pub use mesh::{
    ColourVertex, DynamicMesh, IndexFormat, Mesh, MeshData, MeshDesc, MeshId, PolygonType,
    RenderMesh, SkinnedVertex, SpriteVertex, StaticVertex, Vertex, VertexFormat,
};
pub use shader::{RenderShader, Shader, ShaderData, ShaderDesc, ShaderId};
pub use texture::{RenderTexture, Texture, TextureData, TextureDesc, TextureFormat, TextureId};

use crate::foundation::memory::PoolKey;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Opaque backend data stored on a loaded handle
pub type BackendData = u64;

/// A kind of GPU resource managed through handles
pub trait Resource: Send + Sync + 'static {
    /// Immutable description kept on the handle
    type Desc: Clone + fmt::Debug + Send + Sync;
    /// Creation parameters carried by the load command
    type Data: fmt::Debug + Send;
    /// Human readable name used in logs and assertions
    const NAME: &'static str;
}

/// Lifecycle state of a handle slot
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Load command queued or in flight
    Pending = 0,
    /// Backend created the resource
    Loaded = 1,
    /// Backend could not create the resource; draws referencing it are skipped
    Failed = 2,
    /// Owner destroyed the handle; unload command queued
    UnloadQueued = 3,
}

impl ResourceState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loaded,
            2 => Self::Failed,
            3 => Self::UnloadQueued,
            _ => Self::Pending,
        }
    }
}

/// Per-handle state shared between the game side and the backend
#[derive(Debug, Default)]
pub struct ResourceSlot {
    state: AtomicU8,
    backend_data: AtomicU64,
}

impl ResourceSlot {
    /// Current lifecycle state
    pub fn state(&self) -> ResourceState {
        ResourceState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Backend data, meaningful once the resource has loaded
    pub fn backend_data(&self) -> BackendData {
        self.backend_data.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.backend_data.store(0, Ordering::Relaxed);
        self.state.store(ResourceState::Pending as u8, Ordering::Release);
    }

    fn set_state(&self, state: ResourceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move from `Pending` to `state`; later states are left untouched
    fn resolve_pending(&self, state: ResourceState) -> bool {
        self.state
            .compare_exchange(
                ResourceState::Pending as u8,
                state as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn set_backend_data(&self, data: BackendData) {
        self.backend_data.store(data, Ordering::Release);
    }
}

/// Copyable reference to a handle, used by render objects and commands
///
/// Ids do not own anything. They stop resolving once the handle's slot is
/// released.
pub struct ResourceId<R> {
    key: PoolKey,
    _marker: PhantomData<fn() -> R>,
}

impl<R> ResourceId<R> {
    const fn new(key: PoolKey) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }

    /// Pool key behind this id
    pub const fn key(&self) -> PoolKey {
        self.key
    }
}

impl<R> Clone for ResourceId<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for ResourceId<R> {}

impl<R> PartialEq for ResourceId<R> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<R> Eq for ResourceId<R> {}

impl<R> Hash for ResourceId<R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<R: Resource> fmt::Debug for ResourceId<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}v{}", R::NAME, self.key.index(), self.key.generation())
    }
}

/// Owning handle returned by `create`
///
/// There is exactly one owner per handle. Give it back through the manager's
/// `destroy`; dropping it instead leaks the pool slot.
#[must_use = "dropping a handle without destroying it leaks its pool slot"]
pub struct Handle<R: Resource> {
    id: ResourceId<R>,
    desc: R::Desc,
}

impl<R: Resource> Handle<R> {
    /// Id to reference this resource from render objects
    pub const fn id(&self) -> ResourceId<R> {
        self.id
    }

    /// Immutable description supplied at creation
    pub const fn desc(&self) -> &R::Desc {
        &self.desc
    }
}

impl<R: Resource> fmt::Debug for Handle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish()
    }
}
