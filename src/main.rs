//! Stealpool - CLI
//!
//! Drives the scheduler with synthetic workloads and reports its statistics.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use stealpool::util::{config, logger};
use stealpool::{
    current, Scheduler, SchedulerConfig, SchedulerError, SchedulerStats, NAME, VERSION,
};

/// Work-stealing thread pool driver
#[derive(Parser, Debug)]
#[command(name = "stealpool")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Number of worker threads (0 = one per CPU)
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Per-worker queue capacity
    #[arg(long, global = true)]
    queue_capacity: Option<usize>,

    /// Config file (defaults to ~/.config/stealpool/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print statistics as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a flat batch of tasks that each bump a shared counter
    Run {
        /// Number of tasks to submit
        #[arg(short, long, default_value_t = 100_000)]
        tasks: u64,

        /// Busy-work iterations per task
        #[arg(long, default_value_t = 0)]
        spin: u64,
    },

    /// Submit one root task that fans out recursively from inside the pool
    Tree {
        /// Levels below the root
        #[arg(short, long, default_value_t = 6)]
        depth: u32,

        /// Children spawned by each task
        #[arg(short, long, default_value_t = 4)]
        breadth: u32,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logger::init_with_level(logger::LogLevel::from_verbosity(args.verbose));

    let pool_config = effective_config(&args)?;

    match args.command {
        Commands::Run { tasks, spin } => {
            let stats = run_flat(pool_config, tasks, spin)?;
            report(&stats, args.json)?;
        }
        Commands::Tree { depth, breadth } => {
            let stats = run_tree(pool_config, depth, breadth)?;
            report(&stats, args.json)?;
        }
        Commands::Config => {
            print!("{}", config::to_toml_string(&pool_config)?);
        }
    }

    Ok(())
}

fn effective_config(args: &Args) -> Result<SchedulerConfig> {
    let mut pool_config =
        config::load(args.config.as_deref()).with_context(|| match &args.config {
            Some(path) => format!("Failed to load config: {}", path.display()),
            None => "Failed to load user config".to_string(),
        })?;

    // CLI flags win over file and environment.
    if let Some(workers) = args.workers {
        pool_config.num_workers = workers;
    }
    if let Some(capacity) = args.queue_capacity {
        pool_config.queue_capacity = capacity;
    }
    Ok(pool_config)
}

fn run_flat(
    config: SchedulerConfig,
    tasks: u64,
    spin: u64,
) -> Result<SchedulerStats> {
    let scheduler = Scheduler::with_config(config).context("Failed to start scheduler")?;
    let counter = Arc::new(AtomicU64::new(0));
    let started = Instant::now();

    let mut dropped = 0u64;
    for _ in 0..tasks {
        let counter = Arc::clone(&counter);
        let submitted = scheduler.submit(move || {
            busy_work(spin);
            counter.fetch_add(1, Ordering::Relaxed);
        });
        if submitted.is_err() {
            dropped += 1;
        }
    }
    scheduler.wait();

    info!(
        tasks,
        executed = counter.load(Ordering::Relaxed),
        dropped,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "flat workload finished"
    );

    let stats = scheduler.stats();
    scheduler.shutdown();
    Ok(stats)
}

fn run_tree(
    config: SchedulerConfig,
    depth: u32,
    breadth: u32,
) -> Result<SchedulerStats> {
    let scheduler = Scheduler::with_config(config).context("Failed to start scheduler")?;
    let counter = Arc::new(AtomicU64::new(0));
    let started = Instant::now();

    let root_counter = Arc::clone(&counter);
    scheduler
        .submit(move || fan_out(root_counter, depth, breadth))
        .context("Failed to submit root task")?;
    scheduler.wait();

    info!(
        depth,
        breadth,
        executed = counter.load(Ordering::Relaxed),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "tree workload finished"
    );

    let stats = scheduler.stats();
    scheduler.shutdown();
    Ok(stats)
}

fn fan_out(
    counter: Arc<AtomicU64>,
    depth: u32,
    breadth: u32,
) {
    counter.fetch_add(1, Ordering::Relaxed);
    if depth == 0 {
        return;
    }

    let Some(pool) = current() else {
        return;
    };
    for _ in 0..breadth {
        let counter = Arc::clone(&counter);
        match pool.submit(move || fan_out(counter, depth - 1, breadth)) {
            Ok(()) => {}
            // Also counted in the dropped-task statistic.
            Err(SchedulerError::QueueFull { worker }) => {
                debug!(worker, depth, "fan-out child dropped");
            }
            Err(err) => {
                warn!(%err, "fan-out stopped");
                return;
            }
        }
    }
}

fn busy_work(iterations: u64) {
    let mut acc = 0u64;
    for i in 0..iterations {
        acc = std::hint::black_box(acc.wrapping_mul(31).wrapping_add(i));
    }
    std::hint::black_box(acc);
}

fn report(
    stats: &SchedulerStats,
    json: bool,
) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(stats).context("Failed to encode statistics")?
        );
    } else {
        println!("{}", stats);
    }
    Ok(())
}
