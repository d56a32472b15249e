//! Task queue for the scheduler
//!
//! Fixed-capacity circular buffer guarded by one mutex. The owning worker pops
//! from it, every other worker steals from it, and both take the same lock and
//! dequeue from the same end.

use parking_lot::Mutex;

use super::task::Task;
use super::SchedulerError;

/// Default number of slots per worker queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Ring {
    slots: Box<[Option<Task>]>,
    head: usize,
    tail: usize,
    count: usize,
}

impl Ring {
    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn push(
        &mut self,
        task: Task,
    ) -> Result<(), Task> {
        if self.count == self.capacity() {
            return Err(task);
        }
        self.slots[self.tail] = Some(task);
        self.tail = (self.tail + 1) % self.capacity();
        self.count += 1;
        Ok(())
    }

    fn take_head(&mut self) -> Option<Task> {
        if self.count == 0 {
            return None;
        }
        let task = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.count -= 1;
        task
    }
}

/// A bounded, thread-safe task queue owned by one worker.
#[derive(Debug)]
pub struct TaskQueue {
    inner: Mutex<Ring>,
}

impl TaskQueue {
    /// Create an empty queue with room for `capacity` tasks.
    ///
    /// The slot array is reserved up front; allocation failure is reported
    /// instead of aborting the process.
    pub fn with_capacity(capacity: usize) -> Result<Self, SchedulerError> {
        if capacity == 0 {
            return Err(SchedulerError::InvalidConfig(
                "queue capacity must be at least 1".to_string(),
            ));
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| SchedulerError::QueueAllocation { capacity })?;
        slots.resize_with(capacity, || None);

        Ok(Self {
            inner: Mutex::new(Ring {
                slots: slots.into_boxed_slice(),
                head: 0,
                tail: 0,
                count: 0,
            }),
        })
    }

    /// Enqueue at the tail.
    ///
    /// Never blocks or grows: a full queue hands the task straight back.
    #[inline]
    pub fn push(
        &self,
        task: Task,
    ) -> Result<(), Task> {
        self.inner.lock().push(task)
    }

    /// Dequeue from the head. Used by the owning worker.
    #[inline]
    pub fn pop(&self) -> Option<Task> {
        self.inner.lock().take_head()
    }

    /// Dequeue from the head on behalf of another worker.
    ///
    /// Same end, same lock as [`TaskQueue::pop`].
    #[inline]
    pub fn steal(&self) -> Option<Task> {
        self.inner.lock().take_head()
    }

    /// Get the number of queued tasks.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    /// Check if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of tasks the queue holds.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    /// Remove every queued task, handing each to `f`.
    pub(crate) fn drain_with(
        &self,
        mut f: impl FnMut(Task),
    ) -> usize {
        let mut ring = self.inner.lock();
        let mut drained = 0;
        while let Some(task) = ring.take_head() {
            f(task);
            drained += 1;
        }
        drained
    }
}
