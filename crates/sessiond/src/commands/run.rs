//! Run command - host the session store until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use sessiond_store::SessionStore;
use tracing::info;

use super::Context;
use crate::events::EventLog;

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Seconds between statistics log lines (0 disables)
    #[arg(long, default_value_t = 60)]
    pub stats_interval: u64,

    /// Maximum resident sessions (overrides config)
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Disable capacity checks (overrides config)
    #[arg(long)]
    pub no_limit: bool,

    /// Stop on its own after this many seconds
    #[arg(long)]
    pub exit_after: Option<u64>,
}

/// Run the store.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let mut section = ctx.loaded.config.store_or_default();
    if let Some(max) = args.max_sessions {
        section.max_sessions = max;
    }
    if args.no_limit {
        section.no_limit = true;
    }
    section.validate()?;

    let store = SessionStore::new(section.to_store_config());
    let events = Arc::new(EventLog::new());
    store.add_listener(events.clone());
    let clock = store.start_clock();

    info!(
        stats_interval_secs = args.stats_interval,
        "sessiond running, press Ctrl-C to stop"
    );

    let mut stats_tick = tokio::time::interval(Duration::from_secs(args.stats_interval.max(1)));
    stats_tick.tick().await;

    let deadline = async {
        match args.exit_after {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Interrupt received, shutting down");
                break;
            }
            _ = &mut deadline => {
                info!("Run time elapsed, shutting down");
                break;
            }
            _ = stats_tick.tick(), if args.stats_interval > 0 => {
                let stats = store.stats();
                info!(
                    active = stats.active,
                    random_tokens = stats.random_tokens,
                    pending_promotions = stats.pending_promotions,
                    migrations = stats.migrations,
                    short_term_rotations = stats.short_term_rotations,
                    long_term_rotations = stats.long_term_rotations,
                    "Store statistics"
                );
            }
        }
    }

    clock.stop().await;
    let stats = store.stats();
    store.shutdown();

    if ctx.json_output {
        let summary = serde_json::json!({
            "stats": stats,
            "events": events.counts(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Stopped after {} short-term and {} long-term rotations ({} sessions resident).",
            stats.short_term_rotations, stats.long_term_rotations, stats.active
        );
    }
    Ok(())
}
