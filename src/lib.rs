//! Stealpool
//!
//! A fixed-size pool of worker threads that runs fire-and-forget jobs from
//! per-worker bounded queues, balanced by randomized work stealing.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use stealpool::Scheduler;
//!
//! fn main() -> Result<(), stealpool::SchedulerError> {
//!     let scheduler = Scheduler::new(4)?;
//!     let counter = Arc::new(AtomicUsize::new(0));
//!
//!     for _ in 0..1000 {
//!         let counter = Arc::clone(&counter);
//!         scheduler.submit(move || {
//!             counter.fetch_add(1, Ordering::Relaxed);
//!         })?;
//!     }
//!
//!     scheduler.wait();
//!     assert_eq!(counter.load(Ordering::Relaxed), 1000);
//!     scheduler.shutdown();
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/stealpool")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use runtime::scheduler::{
    current, current_worker_index, parallel_for, BatchError, Scheduler, SchedulerConfig,
    SchedulerError, SchedulerHandle, SchedulerStats, Task, TaskFn, WorkerStats,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "stealpool";
