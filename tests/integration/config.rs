//! Config files feeding scheduler construction.

use std::fs;

use stealpool::util::config;
use stealpool::Scheduler;

#[test]
fn scheduler_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stealpool.toml");
    fs::write(
        &path,
        "[scheduler]\nnum_workers = 3\nqueue_capacity = 32\nthread_name_prefix = \"cfg\"\n",
    )
    .unwrap();

    let pool_config = config::load_file(Some(&path)).unwrap();
    let scheduler = Scheduler::with_config(pool_config).unwrap();
    assert_eq!(scheduler.num_workers(), 3);

    scheduler.submit(|| {}).unwrap();
    scheduler.wait();
    assert_eq!(scheduler.stats().tasks_completed, 1);
}

#[test]
fn invalid_config_file_is_rejected_by_scheduler() {
    let pool_config = config::from_toml_str("[scheduler]\nqueue_capacity = 0\n").unwrap();
    assert!(Scheduler::with_config(pool_config).is_err());
}
