//! # Renderer
//!
//! Entry point the game thread calls once per tick.
//!
//! ## Frame Flow
//!
//! 1. Drain pending resource commands from the managers into the snapshot
//! 2. Freeze the snapshot's frame behind an `Arc`
//! 3. Compile target render pass groups in parallel
//! 4. Compile the groups into a command buffer, also in parallel, reusing a
//!    buffer the backend has handed back when one is available
//! 5. Push the buffer onto the queue for the backend thread

use super::command_compiler::RenderCommandCompiler;
use super::command_queue::RenderCommandSender;
use super::commands::RenderCommandBuffer;
use super::pass_compiler::RenderPassCompiler;
use super::snapshot::RenderSnapshot;
use super::RenderError;
use crate::core::config::PipelineConfig;
use crate::resources::ResourceManagers;
use crate::tasks::TaskContext;
use std::sync::Arc;

/// Turns render snapshots into queued command buffers
pub struct Renderer {
    managers: Arc<ResourceManagers>,
    pass_compiler: RenderPassCompiler,
    command_compiler: RenderCommandCompiler,
    queue: RenderCommandSender,
    frame_index: u64,
}

impl Renderer {
    /// Create a renderer feeding `queue`, draining resource commands from `managers`
    pub fn new(
        config: &PipelineConfig,
        managers: Arc<ResourceManagers>,
        queue: RenderCommandSender,
    ) -> Self {
        let command_compiler = RenderCommandCompiler::new(config.batching, managers.meshes.view());
        log::info!(
            "Renderer created (frustum culling {}, batch threshold {} vertices)",
            if config.frustum_culling { "on" } else { "off" },
            config.batching.small_mesh_vertex_threshold
        );

        Self {
            managers,
            pass_compiler: RenderPassCompiler::new(config.frustum_culling),
            command_compiler,
            queue,
            frame_index: 0,
        }
    }

    /// Compile a snapshot without queueing it
    pub fn compile_snapshot(
        &mut self,
        ctx: &dyn TaskContext,
        mut snapshot: RenderSnapshot,
    ) -> RenderCommandBuffer {
        self.managers.drain_into(&mut snapshot);

        let (frame, pre_render, post_render) = snapshot.into_parts();
        let frame = Arc::new(frame);
        log::debug!(
            "Frame {}: {} objects, {} directional lights, {} point lights",
            self.frame_index,
            frame.objects.len(),
            frame.directional_lights.len(),
            frame.point_lights.len()
        );

        let targets = self.pass_compiler.compile_target_render_pass_groups(ctx, &frame);
        // Targets hold the only other references; the frame is freed with them
        drop(frame);

        let buffer = self.queue.acquire(self.frame_index);
        let buffer = self
            .command_compiler
            .compile(ctx, buffer, targets, pre_render, post_render);
        self.frame_index += 1;
        buffer
    }

    /// Compile a snapshot and hand the result to the backend thread
    ///
    /// Blocks while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::QueueClosed`] if the backend side has shut down.
    pub fn render_snapshot(
        &mut self,
        ctx: &dyn TaskContext,
        snapshot: RenderSnapshot,
    ) -> Result<(), RenderError> {
        let buffer = self.compile_snapshot(ctx, snapshot);
        self.queue.push(buffer)
    }

    /// Stop sending draw commands to the backend; resource commands still flow
    pub fn suspend(&self) {
        self.queue.suspend();
    }

    /// Resume sending draw commands
    pub fn resume(&self) {
        self.queue.resume();
    }

    /// Number of snapshots compiled so far
    pub const fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Managers this renderer drains
    pub fn managers(&self) -> &Arc<ResourceManagers> {
        &self.managers
    }
}
