//! Resource managers and the deferred load/unload commands they queue

use super::{
    BackendData, Handle, Mesh, Resource, ResourceId, ResourceSlot, ResourceState, Shader, Texture,
};
use crate::core::config::ResourcePoolConfig;
use crate::foundation::memory::PoolAllocator;
use crate::render::commands::RenderCommand;
use crate::render::snapshot::RenderSnapshot;
use crate::render::BackendResult;
use parking_lot::Mutex;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

type SlotPool = PoolAllocator<ResourceSlot>;

/// Deferred creation of a resource, executed by the backend
pub struct LoadCommand<R: Resource> {
    id: ResourceId<R>,
    desc: R::Desc,
    data: R::Data,
    pool: Arc<SlotPool>,
}

impl<R: Resource> LoadCommand<R> {
    /// Handle being loaded
    pub const fn id(&self) -> ResourceId<R> {
        self.id
    }

    /// Description of the resource
    pub const fn desc(&self) -> &R::Desc {
        &self.desc
    }

    /// Creation parameters
    pub const fn data(&self) -> &R::Data {
        &self.data
    }

    /// Record the backend's result on the handle
    ///
    /// Success stores the backend data and marks the handle loaded. Failure
    /// marks it failed so draws referencing it are skipped. A handle destroyed
    /// before its load executed keeps its `UnloadQueued` state but still
    /// receives the backend data so the unload can release it.
    pub fn complete(&self, result: BackendResult<BackendData>) {
        let Some(slot) = self.pool.get(self.id.key()) else {
            log::warn!("Load completed for released {:?}", self.id);
            return;
        };

        match result {
            Ok(data) => {
                slot.set_backend_data(data);
                slot.resolve_pending(ResourceState::Loaded);
            }
            Err(error) => {
                log::error!("Failed to load {:?}: {error}", self.id);
                slot.resolve_pending(ResourceState::Failed);
            }
        }
    }
}

impl<R: Resource> fmt::Debug for LoadCommand<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadCommand")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

/// Deferred destruction of a resource
///
/// Owns the handle. The pool slot is released when the command is dropped,
/// after the backend has executed it.
pub struct UnloadCommand<R: Resource> {
    handle: Handle<R>,
    pool: Arc<SlotPool>,
}

impl<R: Resource> UnloadCommand<R> {
    /// Handle being unloaded
    pub const fn id(&self) -> ResourceId<R> {
        self.handle.id
    }

    /// Description of the resource
    pub const fn desc(&self) -> &R::Desc {
        &self.handle.desc
    }

    /// Backend data recorded when the resource loaded, zero if it never did
    pub fn backend_data(&self) -> BackendData {
        self.pool
            .get(self.handle.id.key())
            .map_or(0, ResourceSlot::backend_data)
    }
}

impl<R: Resource> Drop for UnloadCommand<R> {
    fn drop(&mut self) {
        let key = self.handle.id.key();
        if self.pool.contains(key) {
            self.pool.release(key);
        } else {
            log::error!("Unload command for {:?} found its slot already released", self.handle.id);
        }
    }
}

impl<R: Resource> fmt::Debug for UnloadCommand<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnloadCommand")
            .field("id", &self.handle.id)
            .finish_non_exhaustive()
    }
}

struct PendingCommands<R: Resource> {
    loads: Vec<LoadCommand<R>>,
    unloads: Vec<UnloadCommand<R>>,
}

/// Allocates handles for one resource type and queues their commands
///
/// Safe to call from any thread. The only lock guards the pending command
/// lists; state lookups go straight to the pool's atomics.
pub struct ResourceManager<R: Resource> {
    pool: Arc<SlotPool>,
    pending: Mutex<PendingCommands<R>>,
}

impl<R: Resource> ResourceManager<R> {
    /// Create a manager with room for `capacity` live handles
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: Arc::new(PoolAllocator::new(capacity)),
            pending: Mutex::new(PendingCommands {
                loads: Vec::new(),
                unloads: Vec::new(),
            }),
        }
    }

    /// Allocate a handle and queue its load command
    ///
    /// The handle is usable immediately, before the backend has loaded it.
    ///
    /// # Panics
    ///
    /// Panics when the handle pool is exhausted.
    pub fn create(&self, desc: R::Desc, data: R::Data) -> Handle<R> {
        let (key, slot) = self.pool.allocate();
        slot.reset();

        let id = ResourceId::new(key);
        log::trace!("Created {id:?}");

        self.pending.lock().loads.push(LoadCommand {
            id,
            desc: desc.clone(),
            data,
            pool: Arc::clone(&self.pool),
        });

        Handle { id, desc }
    }

    /// Give up a handle and queue its unload command
    ///
    /// Accessors on the handle's id assert from this point on.
    pub fn destroy(&self, handle: Handle<R>) {
        self.live_slot(handle.id).set_state(ResourceState::UnloadQueued);
        log::trace!("Queued unload of {:?}", handle.id);

        self.pending.lock().unloads.push(UnloadCommand {
            handle,
            pool: Arc::clone(&self.pool),
        });
    }

    /// Lifecycle state of a live handle
    ///
    /// # Panics
    ///
    /// Panics if the handle was destroyed.
    pub fn state(&self, id: ResourceId<R>) -> ResourceState {
        self.live_slot(id).state()
    }

    /// Backend data of a loaded handle, `None` while pending or failed
    ///
    /// # Panics
    ///
    /// Panics if the handle was destroyed.
    pub fn backend_data(&self, id: ResourceId<R>) -> Option<BackendData> {
        let slot = self.live_slot(id);
        (slot.state() == ResourceState::Loaded).then(|| slot.backend_data())
    }

    /// Whether `id` refers to a handle that has not been destroyed
    pub fn is_valid(&self, id: ResourceId<R>) -> bool {
        self.pool
            .get(id.key())
            .is_some_and(|slot| slot.state() != ResourceState::UnloadQueued)
    }

    /// Number of pool slots in use, including handles awaiting unload
    pub fn live_count(&self) -> usize {
        self.pool.capacity() - self.pool.available()
    }

    /// Read-only state lookups for the render-preparation side
    pub fn view(&self) -> ResourceView<R> {
        ResourceView {
            pool: Arc::clone(&self.pool),
            _marker: PhantomData,
        }
    }

    /// Take every queued load and unload command, leaving the lists empty
    pub fn take_pending(&self) -> (Vec<LoadCommand<R>>, Vec<UnloadCommand<R>>) {
        let mut pending = self.pending.lock();
        (
            std::mem::take(&mut pending.loads),
            std::mem::take(&mut pending.unloads),
        )
    }

    fn live_slot(&self, id: ResourceId<R>) -> &ResourceSlot {
        let slot = self
            .pool
            .get(id.key())
            .unwrap_or_else(|| panic!("{id:?} used after its slot was released"));
        assert!(
            slot.state() != ResourceState::UnloadQueued,
            "{id:?} used after destroy"
        );
        slot
    }
}

/// Shared, lock-free view of handle states
pub struct ResourceView<R: Resource> {
    pool: Arc<SlotPool>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Resource> Clone for ResourceView<R> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            _marker: PhantomData,
        }
    }
}

impl<R: Resource> ResourceView<R> {
    /// State of the handle, `None` once its slot has been released
    pub fn state(&self, id: ResourceId<R>) -> Option<ResourceState> {
        self.pool.get(id.key()).map(ResourceSlot::state)
    }

    /// Whether draws referencing the handle should be emitted
    ///
    /// Pending handles are drawable because their load command is ordered
    /// ahead of the draw in the same or an earlier command buffer.
    pub fn is_drawable(&self, id: ResourceId<R>) -> bool {
        matches!(
            self.state(id),
            Some(ResourceState::Pending | ResourceState::Loaded | ResourceState::UnloadQueued)
        )
    }
}

/// The mesh, texture and shader managers, injected where they are needed
pub struct ResourceManagers {
    /// Mesh handles
    pub meshes: ResourceManager<Mesh>,
    /// Texture handles
    pub textures: ResourceManager<Texture>,
    /// Shader handles
    pub shaders: ResourceManager<Shader>,
}

impl ResourceManagers {
    /// Create managers sized from configuration
    pub fn new(config: &ResourcePoolConfig) -> Self {
        Self {
            meshes: ResourceManager::new(config.meshes),
            textures: ResourceManager::new(config.textures),
            shaders: ResourceManager::new(config.shaders),
        }
    }

    /// Move every pending command into the snapshot
    ///
    /// Loads go to the pre-render list (shaders, textures, then meshes) so
    /// they precede any draw in the snapshot. Unloads go to the post-render
    /// list in the reverse order, after every draw that could reference them.
    pub fn drain_into(&self, snapshot: &mut RenderSnapshot) {
        let (shader_loads, shader_unloads) = self.shaders.take_pending();
        let (texture_loads, texture_unloads) = self.textures.take_pending();
        let (mesh_loads, mesh_unloads) = self.meshes.take_pending();

        let load_count = shader_loads.len() + texture_loads.len() + mesh_loads.len();
        let unload_count = shader_unloads.len() + texture_unloads.len() + mesh_unloads.len();
        if load_count + unload_count > 0 {
            log::debug!("Snapshot takes {load_count} loads and {unload_count} unloads");
        }

        let pre = snapshot.pre_render_commands_mut();
        pre.extend(shader_loads.into_iter().map(RenderCommand::LoadShader));
        pre.extend(texture_loads.into_iter().map(RenderCommand::LoadTexture));
        pre.extend(mesh_loads.into_iter().map(RenderCommand::LoadMesh));

        let post = snapshot.post_render_commands_mut();
        post.extend(mesh_unloads.into_iter().map(RenderCommand::UnloadMesh));
        post.extend(texture_unloads.into_iter().map(RenderCommand::UnloadTexture));
        post.extend(shader_unloads.into_iter().map(RenderCommand::UnloadShader));
    }
}
