//! # Render Pipeline
//!
//! Frame snapshot and command pipeline for a multithreaded engine.
//!
//! ## Features
//!
//! - **Resource Handles**: thread-safe mesh, texture and shader managers whose
//!   loads and unloads flow through the command stream
//! - **Pass Compilation**: per-light render passes built and sorted in parallel
//! - **Small-Mesh Batching**: sprites and particles merged into shared buffers
//! - **Concurrent Particles**: simulation on worker tasks, torn-free reads
//! - **Command Queue**: bounded hand-off of finished frames to a backend thread
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_pipeline::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let pool = ThreadPool::new(config.worker_threads)?;
//!     let managers = Arc::new(ResourceManagers::new(&config.resource_pools));
//!     let (sender, receiver) = command_queue::channel(config.command_queue_capacity);
//!     let mut renderer = Renderer::new(&config, Arc::clone(&managers), sender);
//!
//!     let camera = RenderCamera::default();
//!     renderer.render_snapshot(&pool, RenderSnapshot::new(camera, (1280, 720)))?;
//!
//!     let mut backend = HeadlessBackend::new();
//!     if let Some(buffer) = receiver.try_pop() {
//!         buffer.execute(&mut backend);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core pipeline modules
pub mod core;
pub mod config;
pub mod foundation;
pub mod tasks;

// Frame pipeline
pub mod resources;
pub mod render;
pub mod particles;

/// Common imports for pipeline users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, ConfigFormat},
        core::config::{BatchConfig, PipelineConfig, ResourcePoolConfig},
        foundation::math::{Colour, Mat4, Point3, Sphere, Vec2, Vec3},
        particles::{ParticleEffect, ParticleEffectDesc, PlaybackType},
        render::{
            command_queue, DirectionalLight, HeadlessBackend, MaterialId, PassCapabilities,
            PointLight, RenderBackend, RenderCamera, RenderCommand, RenderCommandBuffer,
            RenderError, RenderLayer, RenderObject, RenderSnapshot, Renderer,
        },
        resources::{
            DynamicMesh, MeshData, MeshDesc, RenderMesh, RenderShader, RenderTexture,
            ResourceManagers, ResourceState,
        },
        tasks::{join_all, TaskContext, ThreadPool},
    };
}
