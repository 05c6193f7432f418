//! CLI command implementations

pub mod device;
pub mod logs;
pub mod snapshot;
pub mod status;
pub mod sync;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use finsync_core::adapters::memory::StaticIdentity;
use finsync_core::config;
use finsync_core::ports::IdentityProvider;
use finsync_core::services::{EntryPoint, LoggingService};
use finsync_core::{FinsyncContext, Identity, OperationResult};
use serde::Serialize;

pub const ENV_USER_ID: &str = "FINSYNC_USER_ID";
pub const ENV_USER_EMAIL: &str = "FINSYNC_USER_EMAIL";
pub const ENV_USER_NAME: &str = "FINSYNC_USER_NAME";
pub const ENV_PASSPHRASE: &str = "FINSYNC_PASSPHRASE";

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir();
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Record a command execution, ignoring any errors (logging should never
/// break the app)
pub fn record_command(command: &str) {
    if let Some(logger) = get_logger() {
        let _ = logger.log_command(command);
    }
}

pub fn get_data_dir() -> PathBuf {
    config::data_dir()
}

/// Signed-in identity from `FINSYNC_USER_*`; signed out when no id is set
fn identity_from_env() -> Arc<dyn IdentityProvider> {
    let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

    match var(ENV_USER_ID) {
        Some(id) => {
            let mut identity = Identity::new(id, var(ENV_USER_EMAIL).unwrap_or_default());
            if let Some(name) = var(ENV_USER_NAME) {
                identity = identity.with_name(name);
            }
            Arc::new(StaticIdentity::signed_in(identity))
        }
        None => Arc::new(StaticIdentity::signed_out()),
    }
}

/// Get or create the finsync context
pub fn get_context() -> Result<FinsyncContext> {
    get_context_as(EntryPoint::Cli)
}

pub fn get_context_as(entry_point: EntryPoint) -> Result<FinsyncContext> {
    let data_dir = get_data_dir();
    let passphrase = std::env::var(ENV_PASSPHRASE)
        .ok()
        .filter(|p| !p.is_empty());

    FinsyncContext::new(
        &data_dir,
        identity_from_env(),
        entry_point,
        passphrase.as_deref(),
    )
    .context("Failed to initialize finsync context")
}

/// Print a core result as an `OperationResult` JSON document. The error is
/// handed back so the exit code still reflects it.
pub fn emit_json<T: Serialize>(result: finsync_core::domain::result::Result<T>) -> Result<()> {
    let failure = result.as_ref().err().map(|e| e.to_string());
    let report: OperationResult<T> = result.into();
    println!("{}", serde_json::to_string_pretty(&report)?);
    match failure {
        Some(message) => Err(anyhow::anyhow!(message)),
        None => Ok(()),
    }
}
