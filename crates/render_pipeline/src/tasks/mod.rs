//! # Task System
//!
//! Cooperative fork/join over a fixed pool of worker threads.
//!
//! ## Architecture
//!
//! - **TaskContext**: what the pipeline needs from a scheduler, fork/join plus
//!   fire-and-forget spawning
//! - **ThreadPool**: the default scheduler, workers sharing one job channel
//! - **TaskSlots**: pre-assigned output slots so results come back in
//!   submission order no matter which task finishes first
//!
//! Joining never parks a thread while work is queued: a thread waiting on its
//! children keeps pulling jobs from the shared channel, so nested joins cannot
//! starve the pool.

mod thread_pool;

pub use thread_pool::ThreadPool;

use parking_lot::Mutex;
use std::sync::Arc;

/// A unit of work. The context passed in lets the task fork its own children.
pub type Task = Box<dyn FnOnce(&dyn TaskContext) + Send + 'static>;

/// Scheduler seam used by the pass and command compilers
pub trait TaskContext: Send + Sync {
    /// Run every task and return once all of them have completed
    ///
    /// Completion order is unspecified. A panic in any child is re-raised on
    /// the caller after all children have finished.
    fn process_child_tasks(&self, tasks: Vec<Task>);

    /// Queue a task without waiting for it
    fn spawn(&self, task: Task);
}

/// Errors raised while building a task scheduler
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The OS refused to start a worker thread
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Fixed set of result slots, one per child task
///
/// Slots are created before any task runs; each task receives the writer
/// for its own index and nothing else.
pub struct TaskSlots<T> {
    slots: Arc<[Mutex<Option<T>>]>,
}

impl<T> TaskSlots<T> {
    /// Create `count` empty slots
    pub fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Writer for slot `index`
    pub fn writer(&self, index: usize) -> SlotWriter<T> {
        assert!(index < self.slots.len(), "task slot {index} out of range");
        SlotWriter {
            slots: Arc::clone(&self.slots),
            index,
        }
    }

    /// Collect the results in slot order
    ///
    /// # Panics
    ///
    /// Panics if any slot was never written, which means a task was dropped
    /// without running.
    pub fn into_results(self) -> Vec<T> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.lock()
                    .take()
                    .unwrap_or_else(|| panic!("task slot {index} was never written"))
            })
            .collect()
    }
}

/// Write access to exactly one [`TaskSlots`] entry
pub struct SlotWriter<T> {
    slots: Arc<[Mutex<Option<T>>]>,
    index: usize,
}

impl<T> SlotWriter<T> {
    /// Index of the slot this writer fills
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Store the result. Consumes the writer so a slot is written once.
    pub fn write(self, value: T) {
        let previous = self.slots[self.index].lock().replace(value);
        assert!(previous.is_none(), "task slot {} written twice", self.index);
    }
}

/// Run `jobs` as child tasks and return their results in submission order
pub fn join_all<T, F>(ctx: &dyn TaskContext, jobs: Vec<F>) -> Vec<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn TaskContext) -> T + Send + 'static,
{
    let slots = TaskSlots::new(jobs.len());
    let tasks = jobs
        .into_iter()
        .enumerate()
        .map(|(index, job)| {
            let writer = slots.writer(index);
            let task: Task = Box::new(move |ctx: &dyn TaskContext| writer.write(job(ctx)));
            task
        })
        .collect();

    ctx.process_child_tasks(tasks);
    slots.into_results()
}
