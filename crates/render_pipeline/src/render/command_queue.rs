//! # Render Command Queue
//!
//! Bounded hand-off of compiled command buffers from the render-preparation
//! side to the backend thread.
//!
//! Pushing blocks while the queue is full, which keeps the game thread at
//! most `capacity` frames ahead of the backend. Buffers come out in the order
//! they went in.
//!
//! While suspended (e.g. the window is minimised) pushed buffers lose every
//! draw command but keep their loads and unloads, so handles still reach
//! their loaded or released state.
//!
//! Executed buffers travel back over a second channel. The renderer picks
//! them up with [`RenderCommandSender::acquire`] and compiles the next frame
//! into their already allocated lists.

use super::backend::RenderBackend;
use super::commands::RenderCommandBuffer;
use super::RenderError;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};

/// Create a queue holding up to `capacity` buffers
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn channel(capacity: usize) -> (RenderCommandSender, RenderCommandReceiver) {
    assert!(capacity > 0, "render command queue needs room for at least one buffer");
    let (sender, receiver) = bounded(capacity);
    // Queued buffers plus the one being executed
    let (recycle, recycled) = bounded(capacity + 1);
    (
        RenderCommandSender {
            sender,
            recycled,
            suspended: AtomicBool::new(false),
        },
        RenderCommandReceiver { receiver, recycle },
    )
}

/// Producer side, owned by the renderer
#[derive(Debug)]
pub struct RenderCommandSender {
    sender: Sender<RenderCommandBuffer>,
    recycled: Receiver<RenderCommandBuffer>,
    suspended: AtomicBool,
}

impl RenderCommandSender {
    /// Empty buffer for frame `frame_index`, reusing an executed one if the
    /// backend has returned any
    pub fn acquire(&self, frame_index: u64) -> RenderCommandBuffer {
        match self.recycled.try_recv() {
            Ok(mut buffer) => {
                buffer.reset(frame_index);
                buffer
            }
            Err(_) => RenderCommandBuffer::new(frame_index),
        }
    }

    /// Queue a buffer, blocking while the queue is full
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::QueueClosed`] once the receiver is gone. The
    /// buffer is dropped, which releases any handles its unloads carried.
    pub fn push(&self, mut buffer: RenderCommandBuffer) -> Result<(), RenderError> {
        if self.is_suspended() {
            buffer.retain_resource_commands();
            if buffer.lists().is_empty() {
                log::trace!("Suspended: discarded frame {}", buffer.frame_index());
                return Ok(());
            }
            log::debug!(
                "Suspended: frame {} reduced to {} resource commands",
                buffer.frame_index(),
                buffer.command_count()
            );
        }

        self.sender.send(buffer).map_err(|_| RenderError::QueueClosed)
    }

    /// Stop forwarding draw commands
    pub fn suspend(&self) {
        if !self.suspended.swap(true, Ordering::AcqRel) {
            log::info!("Render command queue suspended");
        }
    }

    /// Forward draw commands again
    pub fn resume(&self) {
        if self.suspended.swap(false, Ordering::AcqRel) {
            log::info!("Render command queue resumed");
        }
    }

    /// Whether draw commands are currently being stripped
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Number of buffers waiting for the backend
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    /// Whether no buffers are waiting
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

/// Consumer side, owned by the backend thread
#[derive(Debug)]
pub struct RenderCommandReceiver {
    receiver: Receiver<RenderCommandBuffer>,
    recycle: Sender<RenderCommandBuffer>,
}

impl RenderCommandReceiver {
    /// Wait for the next buffer
    ///
    /// Returns `None` once the sender is dropped and the queue drained.
    pub fn pop(&self) -> Option<RenderCommandBuffer> {
        self.receiver.recv().ok()
    }

    /// Next buffer if one is ready
    pub fn try_pop(&self) -> Option<RenderCommandBuffer> {
        match self.receiver.try_recv() {
            Ok(buffer) => Some(buffer),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Hand an executed buffer back to the renderer for reuse
    ///
    /// The buffer is dropped instead if the renderer is gone or already has
    /// enough spares.
    pub fn recycle(&self, mut buffer: RenderCommandBuffer) {
        buffer.reset(buffer.frame_index());
        let _ = self.recycle.try_send(buffer);
    }

    /// Wait for the next buffer, execute it on `backend` and recycle it
    ///
    /// Returns false once the sender is dropped and the queue drained.
    pub fn execute_next(&self, backend: &mut dyn RenderBackend) -> bool {
        let Some(mut buffer) = self.pop() else {
            return false;
        };
        buffer.execute_in_place(backend);
        self.recycle(buffer);
        true
    }
}
