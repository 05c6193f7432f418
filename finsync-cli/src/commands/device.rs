//! Device command - show or rename this device

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::get_context;
use crate::output::{create_table, format_time};

#[derive(Subcommand)]
pub enum DeviceCommands {
    /// Change the label other devices see for this one
    Rename {
        /// New device name
        name: String,
    },
}

pub fn run(command: Option<DeviceCommands>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let devices = ctx.orchestrator.devices();

    if let Some(DeviceCommands::Rename { name }) = command {
        devices.rename(&name)?;
        if !json {
            println!("{} {}", "Device renamed to".green(), name);
        }
    }

    let status = ctx.orchestrator.status()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status.device)?);
        return Ok(());
    }

    let mut table = create_table();
    table.add_row(vec!["Id".to_string(), status.device.device_id.to_string()]);
    table.add_row(vec!["Name".to_string(), status.device.device_name.clone()]);
    table.add_row(vec![
        "Last sync".to_string(),
        format_time(status.device.last_sync_at),
    ]);
    table.add_row(vec![
        "Format".to_string(),
        status.device.sync_version.clone(),
    ]);
    println!("{}", table);
    Ok(())
}
