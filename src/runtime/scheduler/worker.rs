//! Worker threads and work stealing.
//!
//! Each worker loops over: pop from its own queue, else probe a few random
//! victims, else back off. Backing off yields while tasks are still in flight
//! somewhere in the pool and sleeps briefly once the pool is empty.

use std::sync::{atomic::Ordering, Arc};
use std::thread;

use crossbeam::utils::CachePadded;
use rand::Rng;
use tracing::{debug, error, trace};

use super::context;
use super::queue::TaskQueue;
use super::stats::WorkerCounters;
use super::task::Task;
use super::{SchedulerError, Shared};

/// Default number of random victims probed per idle iteration.
pub const DEFAULT_STEAL_ATTEMPTS: usize = 5;

/// One queue plus the counters of the thread that owns it.
#[derive(Debug)]
pub(crate) struct Worker {
    pub(crate) queue: TaskQueue,
    pub(crate) counters: CachePadded<WorkerCounters>,
}

impl Worker {
    pub(crate) fn new(queue_capacity: usize) -> Result<Self, SchedulerError> {
        Ok(Self {
            queue: TaskQueue::with_capacity(queue_capacity)?,
            counters: CachePadded::new(WorkerCounters::default()),
        })
    }
}

/// Aborts the process if a task unwinds through the worker loop.
struct AbortOnPanic {
    worker: usize,
}

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(worker = self.worker, "task panicked, aborting");
            std::process::abort();
        }
    }
}

/// Worker thread main loop.
pub(crate) fn run(
    shared: Arc<Shared>,
    index: usize,
) {
    let _binding = context::enter(Arc::clone(&shared), index);
    let mut rng = rand::rng();
    debug!(worker = index, "worker started");

    while !shared.shutdown.load(Ordering::SeqCst) {
        // 1. Local queue
        if let Some(task) = shared.workers[index].queue.pop() {
            execute(&shared, index, task);
            continue;
        }

        // 2. Random victims
        if let Some(task) = steal(&shared, index, &mut rng) {
            execute(&shared, index, task);
            continue;
        }

        // 3. Back off
        shared.workers[index].counters.record_idle();
        if shared.active_tasks.load(Ordering::SeqCst) > 0 {
            thread::yield_now();
        } else {
            thread::sleep(shared.idle_sleep);
        }
    }

    debug!(worker = index, "worker stopped");
}

fn execute(
    shared: &Shared,
    index: usize,
    task: Task,
) {
    let guard = AbortOnPanic { worker: index };
    task.run();
    drop(guard);

    shared.workers[index].counters.record_executed();
    shared.complete_one();
}

/// Probe up to `steal_attempts` random victims, skipping self.
///
/// With a single worker the skip wraps around to the worker itself; its own
/// queue lock is not held at that point, so the probe is harmless.
fn steal(
    shared: &Shared,
    index: usize,
    rng: &mut impl Rng,
) -> Option<Task> {
    let num_workers = shared.workers.len();

    for _ in 0..shared.steal_attempts {
        let mut victim = rng.random_range(0..num_workers);
        if victim == index {
            victim = (victim + 1) % num_workers;
        }

        shared.counters.steals_attempted.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = shared.workers[victim].queue.steal() {
            shared.workers[index].counters.record_steal();
            trace!(worker = index, victim, "stole task");
            return Some(task);
        }
    }

    None
}
