//! Worker thread pool implementing [`TaskContext`]

use super::{Task, TaskContext, TaskError};
use crossbeam_channel::{unbounded, Receiver, SendError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

type Job = Box<dyn FnOnce(&PoolContext) + Send + 'static>;

/// How long an idle worker waits before re-checking for shutdown
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long a joining thread waits for a job before re-checking its children
const JOIN_POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Shared handle onto the job channel, held by every worker and the pool
#[derive(Clone)]
struct PoolContext {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
}

impl PoolContext {
    fn submit(&self, job: Job) {
        // The context owns a receiver, so the channel cannot disconnect while
        // it is alive. Run inline rather than lose the job if it ever does.
        if let Err(SendError(job)) = self.sender.send(job) {
            job(self);
        }
    }

    fn run_one(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(job) => {
                job(self);
                true
            }
            Err(_) => false,
        }
    }
}

struct JoinState {
    remaining: AtomicUsize,
    panicked: AtomicBool,
}

impl TaskContext for PoolContext {
    fn process_child_tasks(&self, tasks: Vec<Task>) {
        if tasks.is_empty() {
            return;
        }

        let join = Arc::new(JoinState {
            remaining: AtomicUsize::new(tasks.len()),
            panicked: AtomicBool::new(false),
        });

        for task in tasks {
            let join = Arc::clone(&join);
            self.submit(Box::new(move |ctx: &PoolContext| {
                if panic::catch_unwind(AssertUnwindSafe(|| task(ctx))).is_err() {
                    join.panicked.store(true, Ordering::Release);
                }
                join.remaining.fetch_sub(1, Ordering::AcqRel);
            }));
        }

        // Help drain the queue instead of sleeping
        while join.remaining.load(Ordering::Acquire) > 0 {
            self.run_one(JOIN_POLL_INTERVAL);
        }

        assert!(!join.panicked.load(Ordering::Acquire), "a child task panicked");
    }

    fn spawn(&self, task: Task) {
        self.submit(Box::new(move |ctx: &PoolContext| {
            if panic::catch_unwind(AssertUnwindSafe(|| task(ctx))).is_err() {
                log::error!("Background task panicked");
            }
        }));
    }
}

/// Simple thread pool for parallel execution
///
/// All workers pull from one multi-consumer channel. A pool with zero
/// workers is valid: joins then run every child on the calling thread, and
/// spawned tasks run before `spawn` returns.
pub struct ThreadPool {
    workers: Vec<Worker>,
    context: PoolContext,
    shutdown: Arc<AtomicBool>,
}

impl ThreadPool {
    /// Start a pool with `size` worker threads
    pub fn new(size: usize) -> Result<Self, TaskError> {
        let (sender, receiver) = unbounded();
        let context = PoolContext { sender, receiver };
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut pool = Self {
            workers: Vec::with_capacity(size),
            context,
            shutdown,
        };

        for id in 0..size {
            // On failure the partially built pool is dropped, which stops
            // the workers already started.
            let worker = Worker::new(id, pool.context.clone(), Arc::clone(&pool.shutdown))?;
            pool.workers.push(worker);
        }

        log::debug!("Started task pool with {size} workers");
        Ok(pool)
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a closure that does not need a task context
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(Box::new(move |_: &dyn TaskContext| f()));
    }
}

impl TaskContext for ThreadPool {
    fn process_child_tasks(&self, tasks: Vec<Task>) {
        self.context.process_child_tasks(tasks);
    }

    fn spawn(&self, task: Task) {
        if self.workers.is_empty() {
            // Nobody would pick it up until the next join
            task(&self.context);
        } else {
            self.context.spawn(task);
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    log::error!("Task worker {} terminated abnormally", worker.id);
                }
            }
        }
    }
}

struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, context: PoolContext, shutdown: Arc<AtomicBool>) -> Result<Self, TaskError> {
        let thread = thread::Builder::new()
            .name(format!("render-worker-{id}"))
            .spawn(move || {
                while !shutdown.load(Ordering::Acquire) {
                    context.run_one(WORKER_POLL_INTERVAL);
                }
            })?;

        Ok(Self {
            id,
            thread: Some(thread),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::join_all;
    use std::sync::mpsc;

    #[test]
    fn test_join_all_preserves_submission_order() {
        let pool = ThreadPool::new(4).unwrap();
        let jobs: Vec<_> = (0..32u64)
            .map(|i| {
                move |_: &dyn TaskContext| {
                    thread::sleep(Duration::from_micros((32 - i) * 50));
                    i * 2
                }
            })
            .collect();

        let results = join_all(&pool, jobs);
        assert_eq!(results, (0..32u64).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_workers_runs_on_caller() {
        let pool = ThreadPool::new(0).unwrap();
        let caller = thread::current().id();
        let results = join_all(&pool, vec![move |_: &dyn TaskContext| thread::current().id() == caller]);
        assert_eq!(results, vec![true]);
    }

    #[test]
    fn test_zero_workers_spawn_runs_inline() {
        let pool = ThreadPool::new(0).unwrap();
        let (tx, rx) = mpsc::channel();
        pool.execute(move || tx.send(7).unwrap());
        assert_eq!(rx.try_recv().unwrap(), 7);
    }

    #[test]
    fn test_nested_joins_do_not_deadlock_single_worker() {
        let pool = ThreadPool::new(1).unwrap();
        let outer: Vec<_> = (0..4usize)
            .map(|i| {
                move |ctx: &dyn TaskContext| {
                    let inner: Vec<_> = (0..4usize).map(|j| move |_: &dyn TaskContext| i * 10 + j).collect();
                    join_all(ctx, inner).into_iter().sum::<usize>()
                }
            })
            .collect();

        let sums = join_all(&pool, outer);
        assert_eq!(sums, vec![6, 46, 86, 126]);
    }

    #[test]
    #[should_panic(expected = "child task panicked")]
    fn test_child_panic_reaches_joiner() {
        let pool = ThreadPool::new(2).unwrap();
        let task: Task = Box::new(|_: &dyn TaskContext| panic!("boom"));
        pool.process_child_tasks(vec![task]);
    }

    #[test]
    fn test_execute_runs_in_background() {
        let pool = ThreadPool::new(2).unwrap();
        let (tx, rx) = mpsc::channel();
        pool.execute(move || tx.send(42).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }
}
