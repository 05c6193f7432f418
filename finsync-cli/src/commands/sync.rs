//! Sync commands - enable, disable, push, pull, unlock, pause and resume

use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::{Confirm, Password};
use finsync_core::config::Config;
use finsync_core::services::{DownloadOutcome, UploadOutcome};

use super::{emit_json, get_context, get_data_dir};
use crate::output::{format_time, info, spinner, success, warning};

pub async fn enable(relay: Option<String>, json: bool) -> Result<()> {
    if let Some(url) = relay {
        save_relay_url(url)?;
    }

    let ctx = get_context()?;
    let bar = spinner("Enabling sync...", json);
    let result = ctx.orchestrator.enable_sync().await;
    bar.finish_and_clear();
    if json {
        return emit_json(result.map(|()| ctx.orchestrator.state()));
    }
    result?;

    let state = ctx.orchestrator.state();

    success("Sync enabled");
    println!("  Last sync: {}", format_time(state.last_sync_time));
    if let Some(error) = &state.error {
        println!(
            "  {} initial upload failed, it will be retried: {}",
            "Warning:".yellow(),
            error
        );
    }
    Ok(())
}

/// Persist the relay URL, keeping every other setting as it is on disk
fn save_relay_url(url: String) -> Result<()> {
    url::Url::parse(&url).with_context(|| format!("Invalid relay URL: {}", url))?;

    let data_dir = get_data_dir();
    let mut config = Config::load_file(&data_dir)?;
    config.sync.relay_url = Some(url);
    config.save(&data_dir)
}

pub fn disable(force: bool, json: bool) -> Result<()> {
    if !force && !json {
        if !Confirm::new()
            .with_prompt("Disable sync on this device? The remembered passphrase is forgotten.")
            .default(false)
            .interact()?
        {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let ctx = get_context()?;
    ctx.orchestrator.disable_sync();

    if json {
        println!("{}", serde_json::json!({"enabled": false}));
    } else {
        success("Sync disabled");
    }
    Ok(())
}

pub async fn push(passphrase: Option<String>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let bar = spinner("Uploading snapshot...", json);
    let result = ctx.orchestrator.upload_snapshot(passphrase.as_deref()).await;
    bar.finish_and_clear();
    if json {
        return emit_json(result);
    }

    print_upload(&result?);
    Ok(())
}

pub async fn pull(passphrase: Option<String>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let bar = spinner("Downloading and merging...", json);
    let result = ctx
        .orchestrator
        .download_and_merge(passphrase.as_deref())
        .await;
    bar.finish_and_clear();
    if json {
        return emit_json(result);
    }

    print_download(&result?);
    Ok(())
}

pub async fn unlock(passphrase: Option<String>, json: bool) -> Result<()> {
    let passphrase = match passphrase {
        Some(p) => p,
        None => Password::new()
            .with_prompt("Sync passphrase used on your other device")
            .interact()?,
    };

    let ctx = get_context()?;
    let bar = spinner("Unlocking...", json);
    let result = ctx.orchestrator.unlock_with_passphrase(&passphrase).await;
    bar.finish_and_clear();
    if json {
        return emit_json(result);
    }

    let outcome = result?;
    success("Unlocked. The passphrase is remembered on this device.");
    print_download(&outcome);
    Ok(())
}

pub fn pause(json: bool) -> Result<()> {
    let ctx = get_context()?;
    ctx.orchestrator.pause_sync()?;
    if json {
        println!("{}", serde_json::json!({"paused": true}));
    } else {
        info("Automatic sync paused. Manual push and pull still work.");
    }
    Ok(())
}

pub fn resume(json: bool) -> Result<()> {
    let ctx = get_context()?;
    ctx.orchestrator.resume_sync()?;
    if json {
        println!("{}", serde_json::json!({"paused": false}));
    } else {
        info("Automatic sync resumed.");
    }
    Ok(())
}

fn print_upload(outcome: &UploadOutcome) {
    success("Snapshot uploaded");
    println!("  Entities: {}", outcome.entity_count);
    println!("  Relay time: {}", format_time(Some(outcome.last_modified)));
}

fn print_download(outcome: &DownloadOutcome) {
    match outcome {
        DownloadOutcome::NoRemoteData => {
            warning("No remote data yet. Push from a device first.");
        }
        DownloadOutcome::Merged(report) => {
            println!(
                "{} from device {} ({})",
                "Merged".green(),
                report.remote_device_id,
                format_time(Some(report.remote_modified))
            );
            println!(
                "  Added: {}  Updated: {}",
                report.summary.added, report.summary.updated
            );
            if !report.imported {
                println!("  Already up to date");
            }
            if report.relay_behind {
                warning("The relay is missing data from this device; run 'finsync push' to retry.");
            }
            for change in &report.changes {
                println!("  • {}", change);
            }
        }
    }
}

