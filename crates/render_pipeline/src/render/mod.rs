//! # Rendering Pipeline
//!
//! Turns a per-tick scene description into an ordered, backend-agnostic
//! command stream.
//!
//! ## Architecture
//!
//! - **RenderSnapshot**: mutable frame under construction on the game thread,
//!   plus the resource commands drained into it
//! - **RenderFrame**: the frozen snapshot, shared read-only by compiler tasks
//! - **RenderPassCompiler**: builds sorted per-light passes in parallel, with
//!   results written into pre-assigned slots
//! - **RenderCommandCompiler**: translates passes into command lists, batching
//!   small dynamic meshes on the way
//! - **RenderCommandQueue**: hands finished buffers to the backend thread
//!
//! ## Ordering
//!
//! A command buffer is `[pre-render loads] [targets...] [post-render unloads]`.
//! Loads always precede the first draw that can reference them and unloads
//! always follow the last one.

pub mod backend;
pub mod batcher;
pub mod command_compiler;
pub mod command_queue;
pub mod commands;
pub mod frame;
pub mod pass;
pub mod pass_compiler;
pub mod render_object;
pub mod renderer;
pub mod snapshot;
pub mod visibility;

#[cfg(test)]
mod pipeline_tests;

pub use backend::{BackendStats, HeadlessBackend, RenderBackend};
pub use batcher::{BatchStats, SmallMeshBatcher};
pub use command_compiler::RenderCommandCompiler;
pub use command_queue::{RenderCommandReceiver, RenderCommandSender};
pub use commands::{RenderCommand, RenderCommandBuffer, RenderCommandKind, RenderCommandList};
pub use frame::{
    AmbientLight, DirectionalLight, PointLight, RenderCamera, RenderFrame, RenderTarget,
    ShadowMapDesc,
};
pub use pass::{
    CameraRenderPassGroup, PassLight, RenderPass, RenderPassObject, TargetRenderPassGroup,
};
pub use pass_compiler::RenderPassCompiler;
pub use render_object::{
    MaterialId, PassCapabilities, RenderLayer, RenderObject, RenderObjectKind, SkinnedAnimation,
};
pub use renderer::Renderer;
pub use snapshot::RenderSnapshot;

use thiserror::Error;

/// High-level rendering error types
///
/// Recoverable failures surfaced by backends and the submission queue.
/// Contract violations inside the pipeline panic instead.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A rendering operation failed during execution
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// The backend could not create a resource
    ///
    /// The handle is marked failed and objects referencing it are skipped.
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Backend-specific error occurred
    #[error("Backend error: {0}")]
    BackendError(String),

    /// The receiving end of the command queue has gone away
    #[error("Render command queue closed")]
    QueueClosed,
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;
