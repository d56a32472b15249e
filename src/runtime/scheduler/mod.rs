//! Work-stealing task scheduler
//!
//! A fixed pool of worker threads runs fire-and-forget tasks out of per-worker
//! bounded queues. Idle workers steal from random victims. Tasks may submit
//! more tasks, and [`Scheduler::wait`] blocks until every submitted task,
//! including the ones spawned recursively, has finished.
//!
//! # Contract
//!
//! - Call [`Scheduler::wait`] only from threads outside the pool. Waiting from
//!   inside a task blocks that task against its own completion and deadlocks.
//! - Shut the pool down only after `wait` has returned. Tasks still queued at
//!   shutdown are discarded without running.
//! - A panicking task aborts the process. Tasks report failure through state
//!   they own (see [`batch`]).

pub mod batch;
pub mod context;
pub mod queue;
pub mod stats;
pub mod task;
pub mod worker;

pub use batch::{parallel_for, BatchError};
pub use context::{current, current_worker_index};
pub use queue::{TaskQueue, DEFAULT_QUEUE_CAPACITY};
pub use stats::{SchedulerStats, WorkerStats};
pub use task::{Task, TaskFn};
pub use worker::DEFAULT_STEAL_ATTEMPTS;

use std::io;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use stats::GlobalCounters;
use worker::Worker;

/// Default idle sleep, in microseconds, when the whole pool is out of work.
pub const DEFAULT_IDLE_SLEEP_US: u64 = 10;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of worker threads; 0 means one per logical CPU.
    pub num_workers: usize,
    /// Slots in each worker's queue.
    pub queue_capacity: usize,
    /// Random victims probed per idle iteration.
    pub steal_attempts: usize,
    /// Sleep when no task is in flight anywhere, in microseconds.
    pub idle_sleep_us: u64,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
    /// Stack size for worker threads; platform default when unset.
    pub stack_size: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_workers: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            steal_attempts: DEFAULT_STEAL_ATTEMPTS,
            idle_sleep_us: DEFAULT_IDLE_SLEEP_US,
            thread_name_prefix: "stealpool-worker".to_string(),
            stack_size: None,
        }
    }
}

impl SchedulerConfig {
    /// Default configuration with `num_threads` workers; `<= 0` means auto.
    pub fn with_workers(num_threads: i32) -> Self {
        Self {
            num_workers: usize::try_from(num_threads).unwrap_or(0),
            ..Self::default()
        }
    }

    /// Worker count after resolving "auto" against the host.
    pub fn resolved_workers(&self) -> usize {
        if self.num_workers > 0 {
            return self.num_workers;
        }
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Idle sleep as a duration.
    #[inline]
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_micros(self.idle_sleep_us)
    }

    /// Reject settings the pool cannot run with.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.queue_capacity == 0 {
            return Err(SchedulerError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(SchedulerError::InvalidConfig(
                "thread_name_prefix must not contain NUL".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scheduler errors.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A worker queue could not be allocated.
    #[error("failed to allocate a task queue of {capacity} slots")]
    QueueAllocation { capacity: usize },

    /// A worker thread could not be started.
    #[error("failed to start worker thread {index}: {source}")]
    ThreadSpawn {
        index: usize,
        #[source]
        source: io::Error,
    },

    /// The target queue and its fallback were full; the task was dropped.
    #[error("task dropped: queue of worker {worker} is full")]
    QueueFull { worker: usize },

    /// The scheduler has already been shut down.
    #[error("scheduler is shut down")]
    ShutDown,

    /// The configuration was rejected.
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),
}

/// State shared by the owner, every worker thread and every handle.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) workers: Box<[Worker]>,
    /// Tasks submitted but not yet finished.
    pub(crate) active_tasks: AtomicUsize,
    pub(crate) shutdown: AtomicBool,
    pub(crate) counters: GlobalCounters,
    /// Round-robin cursor for submissions from outside the pool.
    next_worker: AtomicUsize,
    wait_lock: Mutex<()>,
    wait_cond: Condvar,
    pub(crate) steal_attempts: usize,
    pub(crate) idle_sleep: Duration,
}

impl Shared {
    fn new(
        workers: Vec<Worker>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            workers: workers.into_boxed_slice(),
            active_tasks: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            counters: GlobalCounters::default(),
            next_worker: AtomicUsize::new(0),
            wait_lock: Mutex::new(()),
            wait_cond: Condvar::new(),
            steal_attempts: config.steal_attempts,
            idle_sleep: config.idle_sleep(),
        }
    }

    /// Queues and counters without any threads, for driving the worker
    /// functions by hand.
    #[cfg(test)]
    pub(crate) fn detached(
        num_workers: usize,
        queue_capacity: usize,
    ) -> Arc<Self> {
        let config = SchedulerConfig {
            num_workers,
            queue_capacity,
            ..SchedulerConfig::default()
        };
        let workers = (0..num_workers)
            .map(|_| Worker::new(queue_capacity).unwrap())
            .collect();
        Arc::new(Self::new(workers, &config))
    }

    fn submit_task(
        self: &Arc<Self>,
        task: Task,
    ) -> Result<(), SchedulerError> {
        if self.shutdown.load(Ordering::SeqCst) {
            task.discard();
            return Err(SchedulerError::ShutDown);
        }

        self.counters.tasks_spawned.fetch_add(1, Ordering::SeqCst);
        self.active_tasks.fetch_add(1, Ordering::SeqCst);

        let num_workers = self.workers.len();
        let pushed = match context::worker_index_in(self) {
            // Own queue first, then exactly one neighbour.
            Some(local) => self.workers[local].queue.push(task).or_else(|task| {
                let fallback = (local + 1) % num_workers;
                self.workers[fallback]
                    .queue
                    .push(task)
                    .map_err(|task| (fallback, task))
            }),
            None => {
                let target = self.next_worker.fetch_add(1, Ordering::Relaxed) % num_workers;
                self.workers[target]
                    .queue
                    .push(task)
                    .map_err(|task| (target, task))
            }
        };

        match pushed {
            Ok(()) => Ok(()),
            Err((worker, task)) => {
                self.counters.tasks_dropped.fetch_add(1, Ordering::SeqCst);
                warn!(worker, "task queue full, dropping task");
                task.discard();
                self.complete_one();
                Err(SchedulerError::QueueFull { worker })
            }
        }
    }

    /// Retire one active task, releasing waiters when it was the last.
    pub(crate) fn complete_one(&self) {
        self.retire(1);
    }

    /// Retire `count` active tasks at once.
    fn retire(
        &self,
        count: usize,
    ) {
        if self.active_tasks.fetch_sub(count, Ordering::SeqCst) == count {
            let _guard = self.wait_lock.lock();
            self.wait_cond.notify_all();
        }
    }

    fn wait(self: &Arc<Self>) {
        if let Some(worker) = context::worker_index_in(self) {
            error!(worker, "wait() called from inside the pool; this deadlocks");
        }

        let mut guard = self.wait_lock.lock();
        while self.active_tasks.load(Ordering::SeqCst) > 0 {
            self.wait_cond.wait(&mut guard);
        }
    }

    fn stats(&self) -> SchedulerStats {
        SchedulerStats::collect(
            &self.counters,
            self.workers.iter().map(|worker| &*worker.counters),
        )
    }
}

/// Cloneable reference to a running scheduler.
///
/// Obtained from [`Scheduler::handle`] or, inside a task, from [`current`].
/// Handles keep the shared state alive but not the worker threads: once the
/// owning [`Scheduler`] shuts down, submissions fail with
/// [`SchedulerError::ShutDown`].
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    pub(crate) shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Submit a closure. See [`Scheduler::submit`].
    pub fn submit<F>(
        &self,
        f: F,
    ) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.submit_task(Task::from_closure(f))
    }

    /// Submit a prepared task. See [`Scheduler::submit_task`].
    pub fn submit_task(
        &self,
        task: Task,
    ) -> Result<(), SchedulerError> {
        self.shared.submit_task(task)
    }

    /// Submit a raw function and argument. See [`Scheduler::submit_raw`].
    ///
    /// # Safety
    ///
    /// Same contract as [`Scheduler::submit_raw`].
    pub unsafe fn submit_raw(
        &self,
        function: TaskFn,
        arg: *mut (),
    ) -> Result<(), SchedulerError> {
        // SAFETY: forwarded from the caller.
        self.shared.submit_task(unsafe { Task::new(function, arg) })
    }

    /// Block until no task is active. Must not be called from a task.
    pub fn wait(&self) {
        self.shared.wait()
    }

    /// Best-effort live statistics.
    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats()
    }

    /// Number of workers in the pool.
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.shared.workers.len()
    }

    /// Number of submitted tasks that have not finished yet.
    #[inline]
    pub fn active_tasks(&self) -> usize {
        self.shared.active_tasks.load(Ordering::SeqCst)
    }

    /// Whether both handles refer to the same scheduler.
    #[inline]
    pub fn same_scheduler(
        &self,
        other: &SchedulerHandle,
    ) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

/// Work-stealing scheduler owning a fixed pool of worker threads.
#[derive(Debug)]
pub struct Scheduler {
    handle: SchedulerHandle,
    threads: Vec<thread::JoinHandle<()>>,
}

impl Scheduler {
    /// Create a scheduler with `num_threads` workers; `<= 0` means one per
    /// logical CPU.
    pub fn new(num_threads: i32) -> Result<Self, SchedulerError> {
        Self::with_config(SchedulerConfig::with_workers(num_threads))
    }

    /// Create a scheduler from a full configuration.
    ///
    /// Either every queue and every thread is set up, or everything created
    /// so far is torn down and the error is returned.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        Self::start(config, |_, _| Ok(()))
    }

    /// `before_spawn` runs ahead of each thread spawn and can veto it.
    fn start(
        config: SchedulerConfig,
        before_spawn: impl Fn(usize, &Arc<Shared>) -> io::Result<()>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let num_workers = config.resolved_workers();

        // Queues first. On failure the ones already built drop with `workers`.
        let mut workers = Vec::new();
        workers
            .try_reserve_exact(num_workers)
            .map_err(|_| SchedulerError::QueueAllocation {
                capacity: config.queue_capacity,
            })?;
        for _ in 0..num_workers {
            workers.push(Worker::new(config.queue_capacity)?);
        }

        let shared = Arc::new(Shared::new(workers, &config));

        let mut threads = Vec::with_capacity(num_workers);
        for index in 0..num_workers {
            let mut builder =
                thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, index));
            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let spawned = before_spawn(index, &shared).and_then(|()| {
                let worker_shared = Arc::clone(&shared);
                builder.spawn(move || worker::run(worker_shared, index))
            });
            match spawned {
                Ok(handle) => threads.push(handle),
                Err(source) => {
                    error!(index, %source, "failed to start worker thread, rolling back");
                    shared.shutdown.store(true, Ordering::SeqCst);
                    for handle in threads.drain(..) {
                        let _ = handle.join();
                    }
                    return Err(SchedulerError::ThreadSpawn { index, source });
                }
            }
        }

        debug!(
            workers = num_workers,
            queue_capacity = config.queue_capacity,
            "scheduler started"
        );

        Ok(Self {
            handle: SchedulerHandle { shared },
            threads,
        })
    }

    /// Submit a closure to run on the pool.
    ///
    /// From inside a task the closure lands on the calling worker's queue (or
    /// its right-hand neighbour when that queue is full); from outside it goes
    /// round-robin. When the chosen queue is full the task is dropped and
    /// [`SchedulerError::QueueFull`] is returned.
    pub fn submit<F>(
        &self,
        f: F,
    ) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.submit(f)
    }

    /// Submit a prepared task. Routing and overflow as for [`Scheduler::submit`].
    pub fn submit_task(
        &self,
        task: Task,
    ) -> Result<(), SchedulerError> {
        self.handle.submit_task(task)
    }

    /// Submit a raw function pointer and opaque argument.
    ///
    /// # Safety
    ///
    /// The pointee of `arg` must stay valid until `function(arg)` returns,
    /// which is at the latest when a subsequent [`Scheduler::wait`] returns,
    /// and must be safe to access from a worker thread.
    pub unsafe fn submit_raw(
        &self,
        function: TaskFn,
        arg: *mut (),
    ) -> Result<(), SchedulerError> {
        // SAFETY: forwarded from the caller.
        unsafe { self.handle.submit_raw(function, arg) }
    }

    /// Block until every submitted task, including recursively spawned ones,
    /// has finished.
    ///
    /// Calling this from inside one of this scheduler's tasks deadlocks.
    pub fn wait(&self) {
        self.handle.wait()
    }

    /// Best-effort live statistics; safe to call while tasks are running.
    pub fn stats(&self) -> SchedulerStats {
        self.handle.stats()
    }

    /// Run `f(i)` for every `i` in `0..count` and wait. See [`parallel_for`].
    pub fn parallel_for<F, E>(
        &self,
        count: usize,
        f: F,
    ) -> Result<(), BatchError<E>>
    where
        F: Fn(usize) -> Result<(), E> + Sync,
        E: Send,
    {
        batch::parallel_for(&self.handle, count, f)
    }

    /// Number of workers in the pool.
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.handle.num_workers()
    }

    /// Number of submitted tasks that have not finished yet.
    #[inline]
    pub fn active_tasks(&self) -> usize {
        self.handle.active_tasks()
    }

    /// A cloneable handle for submitting from elsewhere.
    #[inline]
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Stop the workers and release every queue.
    ///
    /// Call only after [`Scheduler::wait`]; anything still queued is
    /// discarded without running and stops counting as active.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.threads.is_empty() {
            return;
        }

        let shared = &self.handle.shared;
        shared.shutdown.store(true, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }

        let abandoned: usize = shared
            .workers
            .iter()
            .map(|worker| worker.queue.drain_with(Task::discard))
            .sum();
        if abandoned > 0 {
            warn!(abandoned, "scheduler shut down with queued tasks, discarding them");
            shared.retire(abandoned);
        }

        debug!(workers = shared.workers.len(), "scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests;
