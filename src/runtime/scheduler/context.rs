//! Per-thread worker binding.
//!
//! A worker thread records which scheduler it belongs to, and its own index,
//! for as long as it runs the worker loop. `submit` uses the binding to route
//! work to the caller's own queue; `current` exposes it to running tasks.

use std::cell::RefCell;
use std::sync::Arc;

use super::{SchedulerHandle, Shared};

struct Binding {
    shared: Arc<Shared>,
    worker: usize,
}

thread_local! {
    static CURRENT_WORKER: RefCell<Option<Binding>> = const { RefCell::new(None) };
}

/// Clears the binding when the worker loop exits, even by unwinding.
pub(crate) struct BindingGuard {
    prev: Option<Binding>,
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        let _ = CURRENT_WORKER.try_with(|cell| cell.replace(prev));
    }
}

/// Bind the calling thread to worker `worker` of `shared`.
pub(crate) fn enter(
    shared: Arc<Shared>,
    worker: usize,
) -> BindingGuard {
    let prev = CURRENT_WORKER.with(|cell| cell.replace(Some(Binding { shared, worker })));
    BindingGuard { prev }
}

/// Index of the calling thread's worker, if it is a worker of `shared`.
pub(crate) fn worker_index_in(shared: &Arc<Shared>) -> Option<usize> {
    CURRENT_WORKER
        .try_with(|cell| {
            cell.borrow()
                .as_ref()
                .filter(|binding| Arc::ptr_eq(&binding.shared, shared))
                .map(|binding| binding.worker)
        })
        .ok()
        .flatten()
}

/// The scheduler the calling thread works for, if any.
///
/// Returns `None` outside of worker threads. Lets a running task submit more
/// work to its own pool.
pub fn current() -> Option<SchedulerHandle> {
    CURRENT_WORKER
        .try_with(|cell| {
            cell.borrow().as_ref().map(|binding| SchedulerHandle {
                shared: Arc::clone(&binding.shared),
            })
        })
        .ok()
        .flatten()
}

/// Index of the worker running on the calling thread, if any.
pub fn current_worker_index() -> Option<usize> {
    CURRENT_WORKER
        .try_with(|cell| cell.borrow().as_ref().map(|binding| binding.worker))
        .ok()
        .flatten()
}
