//! Tasks that spawn tasks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stealpool::{current, Scheduler};

#[test]
fn parent_with_ten_children() {
    let scheduler = Scheduler::new(4).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let parent_counter = Arc::clone(&counter);
    scheduler
        .submit(move || {
            let pool = current().unwrap();
            for _ in 0..10 {
                let counter = Arc::clone(&parent_counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        })
        .unwrap();
    scheduler.wait();

    assert_eq!(counter.load(Ordering::SeqCst), 10);
    assert_eq!(scheduler.stats().tasks_completed, 11);
}

fn chain(
    counter: Arc<AtomicUsize>,
    remaining: usize,
) {
    counter.fetch_add(1, Ordering::SeqCst);
    if remaining > 0 {
        let pool = current().unwrap();
        pool.submit(move || chain(counter, remaining - 1)).unwrap();
    }
}

#[test]
fn long_chain_is_waited_for() {
    // Each link is only submitted once its parent runs, so `wait` must not
    // return between links.
    let scheduler = Scheduler::new(2).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let root = Arc::clone(&counter);
    scheduler.submit(move || chain(root, 299)).unwrap();
    scheduler.wait();

    assert_eq!(counter.load(Ordering::SeqCst), 300);
    assert_eq!(scheduler.active_tasks(), 0);
}

fn fan_out(
    counter: Arc<AtomicUsize>,
    depth: u32,
    breadth: u32,
) {
    counter.fetch_add(1, Ordering::SeqCst);
    if depth == 0 {
        return;
    }
    let pool = current().unwrap();
    for _ in 0..breadth {
        let counter = Arc::clone(&counter);
        pool.submit(move || fan_out(counter, depth - 1, breadth)).unwrap();
    }
}

#[test]
fn wide_tree_spreads_by_stealing() {
    let scheduler = Scheduler::new(4).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let root = Arc::clone(&counter);
    scheduler.submit(move || fan_out(root, 4, 4)).unwrap();
    scheduler.wait();

    // 1 + 4 + 16 + 64 + 256
    assert_eq!(counter.load(Ordering::SeqCst), 341);
    let stats = scheduler.stats();
    assert_eq!(stats.tasks_completed, 341);
    assert_eq!(stats.tasks_spawned, 341);
}
