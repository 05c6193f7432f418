//! Watch command - run the background sync loops until interrupted
//!
//! The context holds the DuckDB file for the whole run.

use anyhow::{bail, Result};
use colored::Colorize;
use finsync_core::services::EntryPoint;

use super::get_context_as;
use crate::output::{format_time, phase_label};

pub async fn run(json: bool) -> Result<()> {
    let ctx = get_context_as(EntryPoint::Daemon)?;
    if !ctx.orchestrator.state().is_enabled() {
        bail!("Sync is not enabled. Run 'finsync enable' first.");
    }

    let timings = ctx.orchestrator.timings();
    let mut states = ctx.orchestrator.subscribe_state();
    ctx.orchestrator.start()?;

    if !json {
        println!(
            "{} polling every {}s. Press Ctrl-C to stop.",
            "Watching".green(),
            timings.poll_interval.as_secs()
        );
        println!(
            "{}",
            "Other finsync commands cannot use the local database until the watcher stops."
                .dimmed()
        );
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if json {
                    println!("{}", serde_json::to_string(&state)?);
                } else {
                    let error = state
                        .error
                        .as_deref()
                        .map(|e| format!("  {}", e.red()))
                        .unwrap_or_default();
                    println!(
                        "[{}] {}  last sync {}{}",
                        chrono::Local::now().format("%H:%M:%S"),
                        phase_label(state.phase()),
                        format_time(state.last_sync_time),
                        error
                    );
                }
            }
        }
    }

    ctx.orchestrator.shutdown().await;
    if !json {
        println!("Stopped.");
    }
    Ok(())
}
