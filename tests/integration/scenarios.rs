//! End-to-end scenarios through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use stealpool::{Scheduler, SchedulerConfig};

#[test]
fn four_workers_thousand_increments() {
    let scheduler = Scheduler::new(4).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..1000 {
        let counter = Arc::clone(&counter);
        scheduler
            .submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    scheduler.wait();

    assert_eq!(counter.load(Ordering::SeqCst), 1000);
    assert_eq!(scheduler.stats().tasks_completed, 1000);
    scheduler.shutdown();
}

#[test]
fn concurrent_external_submitters_conserve_tasks() {
    const SUBMITTERS: usize = 4;
    const PER_SUBMITTER: usize = 500;

    let scheduler = Scheduler::with_config(SchedulerConfig {
        num_workers: 4,
        ..SchedulerConfig::default()
    })
    .unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    thread::scope(|scope| {
        for _ in 0..SUBMITTERS {
            let handle = scheduler.handle();
            let counter = Arc::clone(&counter);
            scope.spawn(move || {
                for _ in 0..PER_SUBMITTER {
                    let counter = Arc::clone(&counter);
                    // Keep the queues from overflowing.
                    while handle.active_tasks() > 512 {
                        thread::yield_now();
                    }
                    handle
                        .submit(move || {
                            counter.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                }
            });
        }
    });
    scheduler.wait();

    let total = (SUBMITTERS * PER_SUBMITTER) as u64;
    let stats = scheduler.stats();
    assert_eq!(counter.load(Ordering::SeqCst) as u64, total);
    assert_eq!(stats.tasks_spawned, total);
    assert_eq!(stats.tasks_completed, total);
    assert_eq!(stats.tasks_dropped, 0);
    assert!(stats.steals_succeeded <= stats.steals_attempted);
    assert!((0.0..=1.0).contains(&stats.cpu_utilization));
}

#[test]
fn per_worker_stats_sum_to_totals() {
    let scheduler = Scheduler::new(3).unwrap();
    for _ in 0..300 {
        scheduler.submit(|| {}).unwrap();
    }
    scheduler.wait();

    let stats = scheduler.stats();
    assert_eq!(stats.workers.len(), 3);
    let completed: u64 = stats.workers.iter().map(|w| w.tasks_completed).sum();
    let stolen: u64 = stats.workers.iter().map(|w| w.steals_succeeded).sum();
    assert_eq!(completed, stats.tasks_completed);
    assert_eq!(stolen, stats.steals_succeeded);
    assert_eq!(completed, 300);
}

#[test]
fn wait_on_idle_pool_is_prompt() {
    let scheduler = Scheduler::new(2).unwrap();
    let started = std::time::Instant::now();
    scheduler.wait();
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
}

#[test]
fn repeated_batches_reuse_the_pool() {
    let scheduler = Scheduler::new(2).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    for round in 1..=5 {
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            scheduler
                .submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        scheduler.wait();
        assert_eq!(counter.load(Ordering::SeqCst), round * 100);
    }
}

#[test]
fn dropping_the_scheduler_stops_workers() {
    let scheduler = Scheduler::new(2).unwrap();
    let handle = scheduler.handle();
    scheduler.submit(|| {}).unwrap();
    scheduler.wait();
    drop(scheduler);

    assert!(handle.submit(|| {}).is_err());
}
