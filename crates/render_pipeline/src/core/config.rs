//! # Pipeline Configuration
//!
//! Tunables for the render pipeline: worker pool size, batching limits,
//! resource pool capacities and command queue depth.
//!
//! ## Configuration Categories
//!
//! - **Tasks**: number of worker threads used for pass and command compilation
//! - **Batching**: small-mesh threshold and shared buffer capacities
//! - **Resources**: fixed capacity of each resource handle pool
//! - **Submission**: how many compiled command buffers may wait for the backend

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

/// Largest vertex capacity a batch may use while still addressing every
/// vertex with 16-bit indices
pub const MAX_BATCH_VERTEX_CAPACITY: usize = u16::MAX as usize + 1;

/// # Batching Configuration
///
/// Limits for the small-mesh batcher. A mesh is only batched when its vertex
/// count is strictly below `small_mesh_vertex_threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Meshes with this many vertices or more are drawn individually
    pub small_mesh_vertex_threshold: usize,
    /// Number of vertices the shared batch buffer holds before flushing
    pub vertex_capacity: usize,
    /// Number of indices the shared batch buffer holds before flushing
    pub index_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            small_mesh_vertex_threshold: 100,
            vertex_capacity: 4096,
            index_capacity: 8192,
        }
    }
}

impl BatchConfig {
    /// Validate the batching limits
    pub fn validate(&self) -> Result<(), String> {
        if self.small_mesh_vertex_threshold == 0 {
            return Err("Small mesh vertex threshold must be at least 1".to_string());
        }
        if self.vertex_capacity > MAX_BATCH_VERTEX_CAPACITY {
            return Err(format!(
                "Batch vertex capacity {} exceeds 16-bit index range",
                self.vertex_capacity
            ));
        }
        if self.small_mesh_vertex_threshold > self.vertex_capacity {
            return Err("Small mesh vertex threshold cannot exceed batch vertex capacity".to_string());
        }
        if self.index_capacity == 0 {
            return Err("Batch index capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

/// # Resource Pool Configuration
///
/// Fixed number of live handles per resource type. Exhausting a pool is a
/// programming error, so size these for the worst case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcePoolConfig {
    /// Mesh handle capacity
    pub meshes: usize,
    /// Texture handle capacity
    pub textures: usize,
    /// Shader handle capacity
    pub shaders: usize,
}

impl Default for ResourcePoolConfig {
    fn default() -> Self {
        Self {
            meshes: 1024,
            textures: 512,
            shaders: 64,
        }
    }
}

/// # Pipeline Configuration
///
/// Top level configuration consumed by [`crate::render::Renderer`] and the
/// task pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads in the task pool. Zero runs every task on the joining thread.
    pub worker_threads: usize,
    /// Cull objects outside the camera frustum before building passes
    pub frustum_culling: bool,
    /// Compiled command buffers that may wait for the backend
    pub command_queue_capacity: usize,
    /// Small-mesh batching limits
    pub batching: BatchConfig,
    /// Resource handle pool capacities
    pub resource_pools: ResourcePoolConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map_or(2, |count| count.get().saturating_sub(1).max(1)),
            frustum_culling: true,
            command_queue_capacity: 1,
            batching: BatchConfig::default(),
            resource_pools: ResourcePoolConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Enable or disable frustum culling
    pub fn with_frustum_culling(mut self, enabled: bool) -> Self {
        self.frustum_culling = enabled;
        self
    }

    /// Set custom batching limits
    pub fn with_batching(mut self, batching: BatchConfig) -> Self {
        self.batching = batching;
        self
    }

    /// Set custom resource pool capacities
    pub fn with_resource_pools(mut self, pools: ResourcePoolConfig) -> Self {
        self.resource_pools = pools;
        self
    }

    /// Set the command queue capacity
    pub fn with_command_queue_capacity(mut self, capacity: usize) -> Self {
        self.command_queue_capacity = capacity;
        self
    }
}

impl Config for PipelineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.batching.validate().map_err(ConfigError::Invalid)?;

        if self.command_queue_capacity == 0 {
            return Err(ConfigError::Invalid("Command queue capacity must be at least 1".to_string()));
        }

        let pools = &self.resource_pools;
        if pools.meshes == 0 || pools.textures == 0 || pools.shaders == 0 {
            return Err(ConfigError::Invalid("Resource pools need at least one slot each".to_string()));
        }

        Ok(())
    }
}
