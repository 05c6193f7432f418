//! Status command - show sync state, device and local data summary

use anyhow::Result;
use colored::Colorize;
use finsync_core::domain::Collection;
use finsync_core::services::SnapshotBuilder;

use super::get_context;
use crate::output::{create_table, format_time, phase_label};

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.orchestrator.status()?;
    let snapshot = SnapshotBuilder::build_full(ctx.local.as_ref())?;

    if json {
        let counts: serde_json::Map<String, serde_json::Value> = Collection::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), snapshot.len_of(*c).into()))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "sync": status,
                "local": counts,
                "emergencyFund": snapshot.emergency_fund,
            }))?
        );
        return Ok(());
    }

    println!("{}", "Sync Status".bold());
    println!();

    let mut table = create_table();
    table.add_row(vec!["State".to_string(), phase_label(status.phase).to_string()]);
    table.add_row(vec![
        "Device".to_string(),
        format!("{} ({})", status.device.device_name, status.device.device_id),
    ]);
    table.add_row(vec![
        "Last sync".to_string(),
        format_time(status.state.last_sync_time),
    ]);
    table.add_row(vec![
        "Relay".to_string(),
        status
            .relay_url
            .clone()
            .unwrap_or_else(|| "not configured".to_string()),
    ]);
    table.add_row(vec![
        "Signed in".to_string(),
        if status.authenticated { "yes" } else { "no" }.to_string(),
    ]);
    table.add_row(vec![
        "Format".to_string(),
        status.device.sync_version.clone(),
    ]);
    println!("{}", table);

    if let Some(error) = &status.state.error {
        println!();
        println!("{} {}", "Last error:".red(), error);
    }

    println!();
    println!("{}", "Local Data".bold());
    let mut counts = create_table();
    for collection in Collection::ALL {
        counts.add_row(vec![
            collection.as_str().to_string(),
            snapshot.len_of(collection).to_string(),
        ]);
    }
    counts.add_row(vec![
        "emergencyFund".to_string(),
        snapshot.emergency_fund.to_string(),
    ]);
    println!("{}", counts);

    Ok(())
}
