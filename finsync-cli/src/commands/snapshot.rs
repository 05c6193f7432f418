//! Export and import commands - plaintext snapshot files
//!
//! `export` writes the full local snapshot as JSON. `import` merges a snapshot
//! file into the local store with the same rules as a relay download.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use finsync_core::ports::LocalStore;
use finsync_core::services::{MergeEngine, SnapshotBuilder};
use finsync_core::Snapshot;

use super::get_context;
use crate::output::format_size;

pub fn export(output: Option<PathBuf>) -> Result<()> {
    let ctx = get_context()?;
    let snapshot = SnapshotBuilder::build_full(ctx.local.as_ref())?;
    let content = serde_json::to_string_pretty(&snapshot)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{} {} entities to {} ({})",
                "Exported".green(),
                snapshot.entity_count(),
                path.display(),
                format_size(content.len() as u64)
            );
        }
        None => println!("{}", content),
    }
    Ok(())
}

pub fn import(file: &Path, dry_run: bool, json: bool) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let incoming = Snapshot::from_json_bytes(&bytes)
        .with_context(|| format!("{} is not a snapshot file", file.display()))?;

    let ctx = get_context()?;
    let local = SnapshotBuilder::build_full(ctx.local.as_ref())?;
    let result = MergeEngine::merge(&local, &incoming);
    MergeEngine::verify(&local, &incoming, &result)?;

    if !dry_run {
        ctx.local.import_snapshot(&result.merged)?;
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "dryRun": dry_run,
                "summary": result.summary(),
                "changes": result.descriptions(),
            }))?
        );
        return Ok(());
    }

    if dry_run {
        println!("{}", "DRY RUN - No changes applied".yellow());
    }
    let summary = result.summary();
    println!("Added: {}  Updated: {}", summary.added, summary.updated);
    for change in result.descriptions() {
        println!("  • {}", change);
    }
    Ok(())
}
