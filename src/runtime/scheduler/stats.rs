//! Scheduler statistics.
//!
//! Live counters are lock-free atomics that only ever increase. A
//! [`SchedulerStats`] is a best-effort snapshot summed from them while the
//! pool keeps running.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters owned by one worker.
#[derive(Debug, Default)]
pub(crate) struct WorkerCounters {
    pub(crate) tasks_completed: AtomicU64,
    pub(crate) steals_succeeded: AtomicU64,
    pub(crate) idle_cycles: AtomicU64,
    pub(crate) work_cycles: AtomicU64,
}

impl WorkerCounters {
    #[inline]
    pub(crate) fn record_executed(&self) {
        self.work_cycles.fetch_add(1, Ordering::SeqCst);
        self.tasks_completed.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn record_steal(&self) {
        self.steals_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn record_idle(&self) {
        self.idle_cycles.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(
        &self,
        index: usize,
    ) -> WorkerStats {
        WorkerStats {
            index,
            tasks_completed: self.tasks_completed.load(Ordering::SeqCst),
            steals_succeeded: self.steals_succeeded.load(Ordering::SeqCst),
            idle_cycles: self.idle_cycles.load(Ordering::SeqCst),
            work_cycles: self.work_cycles.load(Ordering::SeqCst),
        }
    }
}

/// Scheduler-wide live counters.
#[derive(Debug, Default)]
pub(crate) struct GlobalCounters {
    pub(crate) tasks_spawned: AtomicU64,
    pub(crate) steals_attempted: AtomicU64,
    pub(crate) tasks_dropped: AtomicU64,
}

/// Counters of a single worker at snapshot time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Worker index.
    pub index: usize,
    /// Tasks this worker ran to completion.
    pub tasks_completed: u64,
    /// Tasks this worker took from another worker's queue.
    pub steals_succeeded: u64,
    /// Loop iterations that found no work.
    pub idle_cycles: u64,
    /// Loop iterations that ran a task.
    pub work_cycles: u64,
}

/// Aggregated scheduler statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStats {
    /// Tasks run to completion, summed over workers.
    pub tasks_completed: u64,
    /// Successful `submit` calls, including ones whose task was dropped.
    pub tasks_spawned: u64,
    /// Victim probes made by idle workers.
    pub steals_attempted: u64,
    /// Probes that came back with a task, summed over workers.
    pub steals_succeeded: u64,
    /// Idle loop iterations, summed over workers.
    pub idle_cycles: u64,
    /// Busy loop iterations, summed over workers.
    pub work_cycles: u64,
    /// Tasks rejected because their target queues were full.
    pub tasks_dropped: u64,
    /// `work_cycles / (work_cycles + idle_cycles)`, or 0 before any cycle.
    pub cpu_utilization: f64,
    /// Per-worker breakdown.
    pub workers: Vec<WorkerStats>,
}

impl SchedulerStats {
    pub(crate) fn collect<'a>(
        global: &GlobalCounters,
        workers: impl Iterator<Item = &'a WorkerCounters>,
    ) -> Self {
        // Worker counters are read before the global ones. Every success was
        // preceded by its attempt, so the snapshot never shows more steals
        // succeeded than attempted, nor more tasks completed than spawned.
        let workers: Vec<WorkerStats> = workers
            .enumerate()
            .map(|(index, counters)| counters.snapshot(index))
            .collect();

        let tasks_spawned = global.tasks_spawned.load(Ordering::SeqCst);
        let steals_attempted = global.steals_attempted.load(Ordering::SeqCst);
        let tasks_dropped = global.tasks_dropped.load(Ordering::SeqCst);

        let mut stats = Self {
            tasks_spawned,
            steals_attempted,
            tasks_dropped,
            ..Self::default()
        };
        for worker in &workers {
            stats.tasks_completed += worker.tasks_completed;
            stats.steals_succeeded += worker.steals_succeeded;
            stats.idle_cycles += worker.idle_cycles;
            stats.work_cycles += worker.work_cycles;
        }
        stats.cpu_utilization = utilization(stats.work_cycles, stats.idle_cycles);
        stats.workers = workers;
        stats
    }

    /// Fraction of steal attempts that found a task.
    pub fn steal_success_rate(&self) -> f64 {
        if self.steals_attempted == 0 {
            return 0.0;
        }
        self.steals_succeeded as f64 / self.steals_attempted as f64
    }
}

pub(crate) fn utilization(
    work_cycles: u64,
    idle_cycles: u64,
) -> f64 {
    let total = work_cycles + idle_cycles;
    if total == 0 {
        0.0
    } else {
        work_cycles as f64 / total as f64
    }
}

impl fmt::Display for SchedulerStats {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        writeln!(f, "tasks spawned:     {}", self.tasks_spawned)?;
        writeln!(f, "tasks completed:   {}", self.tasks_completed)?;
        writeln!(f, "tasks dropped:     {}", self.tasks_dropped)?;
        writeln!(
            f,
            "steals:            {}/{} ({:.1}%)",
            self.steals_succeeded,
            self.steals_attempted,
            self.steal_success_rate() * 100.0
        )?;
        writeln!(f, "idle cycles:       {}", self.idle_cycles)?;
        write!(f, "cpu utilization:   {:.1}%", self.cpu_utilization * 100.0)?;
        for worker in &self.workers {
            write!(
                f,
                "\n  worker {:>3}: completed={} stolen={} idle={}",
                worker.index, worker.tasks_completed, worker.steals_succeeded, worker.idle_cycles
            )?;
        }
        Ok(())
    }
}
