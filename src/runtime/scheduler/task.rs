//! Task definitions for the scheduler.
//!
//! A task is a plain value: a function pointer plus an opaque argument. It has
//! no identity and no lifecycle of its own; once moved into a queue slot it
//! exists only as queue contents until a worker runs it. A closure task that
//! is dropped without running frees its captured state.

use std::fmt;
use std::mem::ManuallyDrop;

/// Signature of a task entry point.
pub type TaskFn = fn(*mut ());

/// A unit of fire-and-forget work.
///
/// The scheduler never takes ownership of the pointee of `arg`. Whoever builds
/// a raw task guarantees that the pointee outlives the task's execution.
///
/// Tasks move by value between queue slots. They are deliberately not `Copy`:
/// a closure task owns its captured state and must run at most once.
pub struct Task {
    function: TaskFn,
    arg: *mut (),
    /// Reclaims `arg` when the task is thrown away without running.
    discard: Option<TaskFn>,
}

// SAFETY: a task is only ever executed once, on one worker. Whoever created it
// vouched that `arg` may be used from another thread.
unsafe impl Send for Task {}

impl fmt::Debug for Task {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Task")
            .field("function", &(self.function as *const ()))
            .field("arg", &self.arg)
            .field("owned", &self.discard.is_some())
            .finish()
    }
}

impl Task {
    /// Build a task from a raw function pointer and argument.
    ///
    /// # Safety
    ///
    /// `arg` must stay valid, and be safe to use from a worker thread, until
    /// `function` has returned.
    #[inline]
    pub unsafe fn new(
        function: TaskFn,
        arg: *mut (),
    ) -> Self {
        Self {
            function,
            arg,
            discard: None,
        }
    }

    /// Build a task that owns a boxed closure.
    ///
    /// The box is freed either by running the task or by dropping it.
    pub fn from_closure<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let boxed: Box<F> = Box::new(f);
        Self {
            function: call_boxed::<F>,
            arg: Box::into_raw(boxed).cast(),
            discard: Some(drop_boxed::<F>),
        }
    }

    /// Invoke the task on the current thread, consuming it.
    #[inline]
    pub fn run(self) {
        // The function takes over `arg`; skip the discard hook.
        let task = ManuallyDrop::new(self);
        (task.function)(task.arg)
    }

    /// Throw the task away without running it.
    ///
    /// Closure tasks free their captured state; raw tasks leave the pointee
    /// to its owner. Same as dropping the task.
    #[inline]
    pub fn discard(self) {
        drop(self);
    }

    /// The opaque argument passed to the task function.
    #[inline]
    pub fn arg(&self) -> *mut () {
        self.arg
    }

    /// Whether the scheduler is responsible for the argument's storage.
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.discard.is_some()
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if let Some(discard) = self.discard.take() {
            discard(self.arg);
        }
    }
}

fn call_boxed<F: FnOnce() + Send + 'static>(arg: *mut ()) {
    // SAFETY: `arg` came from `Box::into_raw` in `from_closure` and a task is
    // either run or discarded, exactly once.
    let f = unsafe { Box::from_raw(arg.cast::<F>()) };
    f();
}

fn drop_boxed<F: FnOnce() + Send + 'static>(arg: *mut ()) {
    // SAFETY: see `call_boxed`.
    drop(unsafe { Box::from_raw(arg.cast::<F>()) });
}
