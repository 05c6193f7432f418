//! Logs command - inspect what sync did on this machine

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use chrono::{Duration, TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use finsync_core::services::{LogEntry, LoggingService};

use super::get_logger;
use crate::output::{create_table, format_size, success};

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent sync events
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only failed events
        #[arg(long)]
        errors: bool,
        /// Show only one event, e.g. upload_failed
        #[arg(long, conflicts_with = "errors")]
        event: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete old events
    Clear {
        /// Delete events older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u64,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Per-event totals and the log database location
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy the log database for a bug report
    Export {
        /// Destination file
        output: PathBuf,
    },
}

pub fn run(command: LogsCommands) -> Result<()> {
    let log = get_logger().ok_or_else(|| anyhow!("Event log is not available"))?;

    match command {
        LogsCommands::List {
            limit,
            errors,
            event,
            json,
        } => list(&log, limit, errors, event.as_deref(), json),
        LogsCommands::Clear {
            older_than_days,
            force,
            json,
        } => clear(&log, older_than_days, force, json),
        LogsCommands::Stats { json } => stats(&log, json),
        LogsCommands::Export { output } => {
            let path = log.export(&output)?;
            success(&format!("Event log copied to {}", path.display()));
            Ok(())
        }
    }
}

fn list(log: &LoggingService, limit: usize, errors: bool, event: Option<&str>, json: bool) -> Result<()> {
    let entries = match event {
        Some(name) => log.get_by_event(name, limit)?,
        None if errors => log.get_errors(limit)?,
        None => log.get_recent(limit)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No sync events recorded.");
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["Time", "Event", "Device", "Key", "Source", "Detail"]);
    for entry in &entries {
        table.add_row(vec![
            timestamp(entry.timestamp),
            event_label(entry),
            entry
                .device_id
                .as_deref()
                .map(|id| id.chars().take(8).collect())
                .unwrap_or_default(),
            entry.key_source.clone().unwrap_or_default(),
            entry.entry_point.clone(),
            entry
                .error_message
                .clone()
                .or_else(|| entry.command.clone())
                .unwrap_or_default(),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn clear(log: &LoggingService, older_than_days: u64, force: bool, json: bool) -> Result<()> {
    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete sync events older than {} days?", older_than_days))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let cutoff = Utc::now() - Duration::days(older_than_days.min(36_500) as i64);
    let deleted = log.delete_before(cutoff.timestamp_millis())?;

    if json {
        println!("{}", serde_json::json!({ "deleted": deleted }));
    } else {
        println!("Deleted {} events", deleted);
    }
    Ok(())
}

fn stats(log: &LoggingService, json: bool) -> Result<()> {
    let tally = log.tally()?;
    let total: u64 = tally.iter().map(|t| t.count).sum();
    let failures: u64 = tally.iter().map(|t| t.failures).sum();
    let db_path = log.db_path().to_path_buf();
    let size_bytes = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "total": total,
                "failures": failures,
                "events": tally,
                "databasePath": db_path.to_string_lossy(),
                "databaseSizeBytes": size_bytes,
            }))?
        );
        return Ok(());
    }

    println!("{}", "Sync activity".bold());
    if tally.is_empty() {
        println!("  Nothing recorded yet.");
    } else {
        let mut table = create_table();
        table.set_header(vec!["Event", "Count", "Failed", "Last seen"]);
        for t in &tally {
            let failed = if t.failures > 0 {
                t.failures.to_string().red().to_string()
            } else {
                "0".to_string()
            };
            table.add_row(vec![
                t.event.clone(),
                t.count.to_string(),
                failed,
                timestamp(t.last_at),
            ]);
        }
        println!("{}", table);
    }
    println!(
        "  {} events, {} failed, {} at {}",
        total,
        failures,
        format_size(size_bytes),
        db_path.display()
    );
    Ok(())
}

fn timestamp(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Event name, red when the entry carries an error
fn event_label(entry: &LogEntry) -> String {
    if entry.error_message.is_some() {
        entry.event.red().to_string()
    } else {
        entry.event.clone()
    }
}
