//! Finsync Core - encrypted multi-device sync for personal finance data
//!
//! This crate implements the sync engine following hexagonal architecture:
//!
//! - **domain**: Synchronizable entities, snapshots, merge results, sync state
//! - **ports**: Trait definitions for external collaborators (RemoteStore, LocalStore, ...)
//! - **services**: Encryption, device registry, merge engine, sync orchestrator
//! - **adapters**: Concrete implementations (DuckDB, HTTP relay, JSON state file, in-memory)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbLocalStore;
use adapters::http::{HttpRemoteStore, UnconfiguredRelay};
use adapters::json_state::JsonStateStore;
use config::Config;
use ports::{IdentityProvider, RemoteStore};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult};
pub use domain::{Identity, MergeResult, Snapshot, SyncPhase, SyncState, SyncStatus};

const LOCAL_DB_FILE: &str = "finsync.duckdb";

/// Main context for finsync operations
///
/// Wires the DuckDB local store, the JSON state file, the relay client and
/// the event log into one orchestrator for a data directory.
pub struct FinsyncContext {
    pub data_dir: PathBuf,
    pub config: Config,
    pub local: Arc<DuckDbLocalStore>,
    pub state: Arc<JsonStateStore>,
    pub logger: Arc<LoggingService>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl FinsyncContext {
    /// Create a context for `data_dir`.
    ///
    /// With `passphrase`, snapshots are keyed from it instead of the identity.
    pub fn new(
        data_dir: &Path,
        identity: Arc<dyn IdentityProvider>,
        entry_point: EntryPoint,
        passphrase: Option<&str>,
    ) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;
        let config = Config::load(data_dir)?;

        let local = Arc::new(DuckDbLocalStore::open(&data_dir.join(LOCAL_DB_FILE))?);
        let state = Arc::new(JsonStateStore::in_dir(data_dir));
        let logger = Arc::new(LoggingService::new(
            data_dir,
            entry_point,
            env!("CARGO_PKG_VERSION"),
        )?);

        let remote: Arc<dyn RemoteStore> = match &config.sync.relay_url {
            Some(url) => {
                let relay = HttpRemoteStore::new(url, config.sync.timings().request_timeout)?;
                match &config.sync.relay_token {
                    Some(token) => Arc::new(relay.with_token(token.clone())),
                    None => Arc::new(relay),
                }
            }
            None => Arc::new(UnconfiguredRelay),
        };

        let mut orchestrator = SyncOrchestrator::new(
            SyncPorts {
                remote,
                local: local.clone(),
                identity,
                state: state.clone(),
            },
            &config.sync,
        )?
        .with_logger(logger.clone());

        if config.sync.client_signature.is_none() {
            orchestrator = orchestrator.with_client_signature(default_client_signature(
                client_name(entry_point),
            ));
        }
        if let Some(passphrase) = passphrase {
            orchestrator =
                orchestrator.with_key_provider(Box::new(PassphraseKeyProvider::new(passphrase)));
        }

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            local,
            state,
            logger,
            orchestrator: Arc::new(orchestrator),
        })
    }
}

fn client_name(entry_point: EntryPoint) -> &'static str {
    match entry_point {
        EntryPoint::Desktop => "finsync-desktop",
        EntryPoint::Cli | EntryPoint::Daemon => "finsync-cli",
    }
}
