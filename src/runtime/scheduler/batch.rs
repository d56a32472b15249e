//! Indexed batches with caller-side error aggregation.
//!
//! Tasks cannot return anything to the scheduler. Callers that need to know
//! whether a batch of work units failed keep an error flag in a context they
//! own and inspect it once `wait` has returned. [`parallel_for`] packages that
//! pattern: the context lives on the caller's stack, every unit runs as a raw
//! task pointing into it, and the first failure is reported afterwards.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{context, SchedulerError, SchedulerHandle};

/// Why a batch did not complete cleanly.
#[derive(Debug, thiserror::Error)]
pub enum BatchError<E> {
    /// A work unit reported failure. Only the first failure is kept.
    #[error("batch item {index} failed: {error}")]
    Task { index: usize, error: E },

    /// Some work units never ran because their queues were full.
    #[error("{count} batch items were dropped on full queues")]
    Dropped { count: usize },

    /// Called from a worker of the same scheduler; waiting would deadlock.
    #[error("parallel_for called from inside the pool it waits on")]
    NestedWait,

    /// Submission failed for another reason.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

struct Batch<'a, F, E> {
    f: &'a F,
    failed: AtomicBool,
    first_error: Mutex<Option<(usize, E)>>,
}

struct Item<'a, F, E> {
    batch: &'a Batch<'a, F, E>,
    index: usize,
}

fn run_item<F, E>(arg: *mut ())
where
    F: Fn(usize) -> Result<(), E> + Sync,
    E: Send,
{
    // SAFETY: `arg` points into the `items` vector of `parallel_for`, which
    // does not return before `wait` has seen this task finish.
    let item = unsafe { &*(arg as *const Item<'_, F, E>) };
    let batch = item.batch;

    // Skip remaining work once something failed.
    if batch.failed.load(Ordering::Acquire) {
        return;
    }

    if let Err(error) = (batch.f)(item.index) {
        batch.failed.store(true, Ordering::Release);
        let mut first = batch.first_error.lock();
        if first.is_none() {
            *first = Some((item.index, error));
        }
    }
}

/// Run `f(i)` for every `i` in `0..count` on the pool and wait for all of it.
///
/// `f` may borrow from the caller. Once one unit fails, units that have not
/// started yet are skipped. This waits on the whole scheduler, so unrelated
/// tasks submitted concurrently are waited for too.
pub fn parallel_for<F, E>(
    scheduler: &SchedulerHandle,
    count: usize,
    f: F,
) -> Result<(), BatchError<E>>
where
    F: Fn(usize) -> Result<(), E> + Sync,
    E: Send,
{
    if context::worker_index_in(&scheduler.shared).is_some() {
        return Err(BatchError::NestedWait);
    }
    if count == 0 {
        return Ok(());
    }

    let batch = Batch {
        f: &f,
        failed: AtomicBool::new(false),
        first_error: Mutex::new(None),
    };
    let items: Vec<Item<'_, F, E>> = (0..count)
        .map(|index| Item {
            batch: &batch,
            index,
        })
        .collect();

    let mut dropped = 0;
    let mut submit_error = None;
    for item in &items {
        let arg = item as *const Item<'_, F, E> as *mut ();
        // SAFETY: `items` outlives the `wait` below, and `F: Sync`, `E: Send`
        // make the shared context usable from worker threads.
        match unsafe { scheduler.submit_raw(run_item::<F, E>, arg) } {
            Ok(()) => {}
            Err(SchedulerError::QueueFull { .. }) => dropped += 1,
            Err(err) => {
                submit_error = Some(err);
                break;
            }
        }
    }

    // Every submitted item must have finished before `items` goes away.
    scheduler.wait();
    drop(items);

    if let Some((index, error)) = batch.first_error.into_inner() {
        return Err(BatchError::Task { index, error });
    }
    if let Some(err) = submit_error {
        return Err(err.into());
    }
    if dropped > 0 {
        return Err(BatchError::Dropped { count: dropped });
    }
    Ok(())
}
