//! Simulate command - synthetic concurrent load against an in-process store.
//!
//! Each worker runs a fixed mix of operations: logins, lookups of its own
//! earlier sessions, token redemptions and logouts. Rotation runs on a short
//! interval so that aging, promotion and expiry all happen during the run.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use sessiond_store::{Error, SessionRecord, SessionStore, StoreStats};
use tracing::{debug, info};

use super::Context;
use crate::events::{EventCounts, EventLog};

/// Arguments for the simulate command.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of concurrent workers
    #[arg(long, default_value_t = 8)]
    pub workers: usize,

    /// Operations per worker
    #[arg(long, default_value_t = 2000)]
    pub operations: usize,

    /// Distinct users per worker
    #[arg(long, default_value_t = 16)]
    pub users: usize,

    /// Short-term rotation interval in milliseconds
    #[arg(long, default_value_t = 50)]
    pub rotate_ms: u64,

    /// Maximum resident sessions (overrides config)
    #[arg(long)]
    pub max_sessions: Option<usize>,
}

#[derive(Debug, Default)]
struct Counters {
    added: AtomicU64,
    rejected: AtomicU64,
    lookups: AtomicU64,
    hits: AtomicU64,
    redeemed: AtomicU64,
    removed: AtomicU64,
}

/// Outcome of a simulation run.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub workers: usize,
    pub operations: u64,
    pub elapsed_ms: u64,
    pub added: u64,
    pub rejected: u64,
    pub lookups: u64,
    pub hits: u64,
    pub redeemed: u64,
    pub removed: u64,
    pub events: EventCounts,
    pub store: StoreStats,
}

/// Run the simulation.
pub async fn run(args: SimulateArgs, ctx: &Context) -> Result<()> {
    let mut section = ctx.loaded.config.store_or_default();
    if let Some(max) = args.max_sessions {
        section.max_sessions = max;
    }
    section.validate()?;

    let rotate = Duration::from_millis(args.rotate_ms.max(1));
    let config = section
        .to_store_config()
        .with_short_term_interval(rotate)
        .with_long_term_interval(rotate * 4);

    let store = SessionStore::new(config);
    let events = Arc::new(EventLog::new());
    store.add_listener(events.clone());
    let clock = store.start_clock();
    let counters = Arc::new(Counters::default());

    info!(
        workers = args.workers,
        operations = args.operations,
        rotate_ms = rotate.as_millis() as u64,
        "Simulation started"
    );
    let started = Instant::now();

    let mut tasks = Vec::with_capacity(args.workers);
    for worker in 0..args.workers {
        let store = store.clone();
        let counters = Arc::clone(&counters);
        let operations = args.operations;
        let users = args.users.max(1);
        tasks.push(tokio::spawn(async move {
            drive_worker(worker, operations, users, &store, &counters).await;
        }));
    }
    for task in tasks {
        task.await?;
    }

    let elapsed = started.elapsed();
    clock.stop().await;

    let report = SimulationReport {
        workers: args.workers,
        operations: (args.workers * args.operations) as u64,
        elapsed_ms: elapsed.as_millis() as u64,
        added: counters.added.load(Ordering::Relaxed),
        rejected: counters.rejected.load(Ordering::Relaxed),
        lookups: counters.lookups.load(Ordering::Relaxed),
        hits: counters.hits.load(Ordering::Relaxed),
        redeemed: counters.redeemed.load(Ordering::Relaxed),
        removed: counters.removed.load(Ordering::Relaxed),
        events: events.counts(),
        store: store.stats(),
    };
    store.shutdown();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, ctx.verbose);
    }
    Ok(())
}

async fn drive_worker(
    worker: usize,
    operations: usize,
    users: usize,
    store: &SessionStore,
    counters: &Counters,
) {
    let mut sessions: Vec<String> = Vec::new();
    let mut pending_token: Option<String> = None;

    for op in 0..operations {
        match op % 8 {
            0 | 4 => {
                let user = format!("w{worker}-u{}", (op / 8) % users);
                let record = SessionRecord::new(user, format!("ctx-{}", worker % 4))
                    .with_login(format!("user{op}@example.com"))
                    .with_client("simulate");
                match store.add_session(record, false) {
                    Ok(handle) => {
                        counters.added.fetch_add(1, Ordering::Relaxed);
                        pending_token = handle.random_token();
                        sessions.push(handle.session_id().to_string());
                    }
                    Err(Error::CapacityExceeded { .. }) => {
                        counters.rejected.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => debug!(worker, error = %e, "Login rejected"),
                }
            }
            1 | 3 | 5 | 6 => {
                if sessions.is_empty() {
                    continue;
                }
                // Spread lookups over old and new sessions alike.
                let id = &sessions[(op * 7) % sessions.len()];
                counters.lookups.fetch_add(1, Ordering::Relaxed);
                if store.get_by_id(id).is_some() {
                    counters.hits.fetch_add(1, Ordering::Relaxed);
                }
            }
            2 => {
                if let Some(token) = pending_token.take()
                    && store.get_by_random_token(&token).is_some()
                {
                    counters.redeemed.fetch_add(1, Ordering::Relaxed);
                }
            }
            _ => {
                if !sessions.is_empty() {
                    let id = sessions.swap_remove(0);
                    if store.remove(&id).is_some() {
                        counters.removed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }

        if op % 64 == 63 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

fn print_report(report: &SimulationReport, verbose: bool) {
    println!("Simulation finished in {} ms", report.elapsed_ms);
    println!(
        "  {} workers, {} operations",
        report.workers, report.operations
    );
    println!(
        "  logins:   {} added, {} rejected",
        report.added, report.rejected
    );
    println!(
        "  lookups:  {} of {} hit",
        report.hits, report.lookups
    );
    println!("  tokens:   {} redeemed", report.redeemed);
    println!("  logouts:  {}", report.removed);
    println!(
        "  expired:  {} sessions in {} batches, {} reactivated",
        report.events.expired_sessions, report.events.expired_batches, report.events.reactivated
    );
    println!(
        "  store:    {} resident, {} migrations, {} / {} rotations",
        report.store.active,
        report.store.migrations,
        report.store.short_term_rotations,
        report.store.long_term_rotations
    );
    if verbose {
        println!("  short-term generations: {:?}", report.store.short_term);
        println!("  long-term generations:  {:?}", report.store.long_term);
    }
}
