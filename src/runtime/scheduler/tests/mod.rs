//! Scheduler unit tests
//!
//! Queue semantics, routing, completion barriers and statistics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::runtime::scheduler::{
    Scheduler, SchedulerConfig, SchedulerError, SchedulerStats, Task, TaskQueue,
};


/// Scheduler with `workers` threads and `capacity` slots per queue.
fn pool(
    workers: usize,
    capacity: usize,
) -> Scheduler {
    Scheduler::with_config(SchedulerConfig {
        num_workers: workers,
        queue_capacity: capacity,
        ..SchedulerConfig::default()
    })
    .unwrap()
}

#[cfg(test)]
mod task_tests {
    use super::*;

    fn bump(arg: *mut ()) {
        // SAFETY: tests pass a live `AtomicUsize`.
        let counter = unsafe { &*(arg as *const AtomicUsize) };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_raw_task_runs_function_with_arg() {
        let counter = AtomicUsize::new(0);
        let task = unsafe { Task::new(bump, &counter as *const AtomicUsize as *mut ()) };
        assert!(!task.is_owned());
        task.run();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closure_task_runs_once_and_frees_state() {
        let state = Arc::new(AtomicUsize::new(0));
        let captured = Arc::clone(&state);
        let task = Task::from_closure(move || {
            captured.fetch_add(1, Ordering::SeqCst);
        });
        assert!(task.is_owned());
        assert_eq!(Arc::strong_count(&state), 2);

        task.run();
        assert_eq!(state.load(Ordering::SeqCst), 1);
        assert_eq!(Arc::strong_count(&state), 1);
    }

    #[test]
    fn test_discarded_closure_task_frees_state_without_running() {
        let state = Arc::new(AtomicUsize::new(0));
        let captured = Arc::clone(&state);
        let task = Task::from_closure(move || {
            captured.fetch_add(1, Ordering::SeqCst);
        });

        task.discard();
        assert_eq!(state.load(Ordering::SeqCst), 0);
        assert_eq!(Arc::strong_count(&state), 1);
    }

    #[test]
    fn test_dropped_closure_task_frees_state() {
        let state = Arc::new(AtomicUsize::new(0));
        let captured = Arc::clone(&state);
        let task = Task::from_closure(move || {
            captured.fetch_add(1, Ordering::SeqCst);
        });

        drop(task);
        assert_eq!(state.load(Ordering::SeqCst), 0);
        assert_eq!(Arc::strong_count(&state), 1);
    }

    #[test]
    fn test_dropped_queue_frees_queued_closures() {
        let state = Arc::new(AtomicUsize::new(0));
        let queue = TaskQueue::with_capacity(1).unwrap();

        let captured = Arc::clone(&state);
        queue
            .push(Task::from_closure(move || {
                captured.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        // The rejected task comes back to the caller and is dropped here.
        let captured = Arc::clone(&state);
        let rejected = queue.push(Task::from_closure(move || {
            captured.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(rejected.is_err());
        drop(rejected);
        assert_eq!(Arc::strong_count(&state), 2);

        drop(queue);
        assert_eq!(state.load(Ordering::SeqCst), 0);
        assert_eq!(Arc::strong_count(&state), 1);
    }

    #[test]
    fn test_discarded_raw_task_leaves_arg_alone() {
        let counter = AtomicUsize::new(5);
        let task = unsafe { Task::new(bump, &counter as *const AtomicUsize as *mut ()) };
        task.discard();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_task_debug() {
        let task = Task::from_closure(|| {});
        let debug = format!("{:?}", task);
        assert!(debug.contains("Task"));
        assert!(debug.contains("owned: true"));
        task.discard();
    }
}

#[cfg(test)]
mod scheduler_config_tests {
    use super::*;

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.num_workers, 0);
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.steal_attempts, 5);
        assert_eq!(config.idle_sleep_us, 10);
        assert!(config.resolved_workers() >= 1);
    }

    #[test]
    fn test_with_workers_non_positive_means_auto() {
        assert_eq!(SchedulerConfig::with_workers(0).num_workers, 0);
        assert_eq!(SchedulerConfig::with_workers(-4).num_workers, 0);
        assert_eq!(SchedulerConfig::with_workers(3).resolved_workers(), 3);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = SchedulerConfig {
            num_workers: 2,
            queue_capacity: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SchedulerError::InvalidConfig(_))
        ));
        assert!(matches!(
            Scheduler::with_config(config),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }
}

#[cfg(test)]
mod stats_tests {
    use super::*;
    use crate::runtime::scheduler::stats::utilization;

    #[test]
    fn test_utilization_bounds() {
        assert_eq!(utilization(0, 0), 0.0);
        assert_eq!(utilization(5, 0), 1.0);
        assert_eq!(utilization(0, 5), 0.0);
        assert!((utilization(1, 3) - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_steal_success_rate_without_attempts() {
        assert_eq!(SchedulerStats::default().steal_success_rate(), 0.0);
    }

    #[test]
    fn test_stats_display() {
        let scheduler = pool(2, 16);
        scheduler.wait();
        let text = scheduler.stats().to_string();
        assert!(text.contains("tasks completed"));
        assert!(text.contains("worker   0"));
        assert!(text.contains("worker   1"));
    }

    #[test]
    fn test_stats_serialize_json() {
        let scheduler = pool(1, 16);
        scheduler.submit(|| {}).unwrap();
        scheduler.wait();

        let json = serde_json::to_value(scheduler.stats()).unwrap();
        assert_eq!(json["tasks_completed"], 1);
        assert_eq!(json["tasks_spawned"], 1);
        assert_eq!(json["workers"].as_array().unwrap().len(), 1);
    }
}
