//! Sync orchestrator - the state machine that drives upload and download
//!
//! States: `Disabled`, `Enabled/Idle`, `Enabled/Syncing`, `Enabled/Paused`,
//! plus an error overlay. State lives in a `watch` channel so front ends can
//! subscribe to it.
//!
//! At most one cycle runs at a time: every cycle holds `cycle`, an async
//! single-slot lock. Manual calls wait for it, background triggers skip when
//! it is taken. Every remote call runs under a deadline so a hung relay
//! cannot block later cycles.
//!
//! Automatic cycles always upload before they download. A local edit is on
//! the relay before anything remote can be merged over it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::SyncSettings;
use crate::domain::result::{Error, Result};
use crate::domain::{Identity, MergeSummary, Snapshot, SyncMode, SyncState, SyncStatus};
use crate::ports::{state_keys, IdentityProvider, LocalStore, RemoteStore, StateStore};
use crate::services::device::{default_client_signature, DeviceRegistry};
use crate::services::encryption::{EncryptionCodec, SyncKey};
use crate::services::keys::{IdentityKeyProvider, KeyProvider, KeySource};
use crate::services::logging::{events, LogEvent, LoggingService};
use crate::services::merge::MergeEngine;
use crate::services::scheduler::SchedulerHandle;
use crate::services::snapshot::SnapshotBuilder;

/// Durations used by the orchestrator and its background tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTimings {
    /// Quiet period after the last local change before an automatic cycle
    pub debounce: Duration,
    /// Pause between the upload and the freshness check of an automatic cycle
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    pub auth_poll_interval: Duration,
    /// Longest wait for a still-loading identity before giving up
    pub auth_wait_timeout: Duration,
    /// Deadline for each remote call
    pub request_timeout: Duration,
}

impl Default for SyncTimings {
    fn default() -> Self {
        SyncSettings::default().timings()
    }
}

/// External collaborators the orchestrator drives
#[derive(Clone)]
pub struct SyncPorts {
    pub remote: Arc<dyn RemoteStore>,
    pub local: Arc<dyn LocalStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub state: Arc<dyn StateStore>,
}

/// Result of a successful upload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    /// Timestamp the relay assigned to the record
    pub last_modified: DateTime<Utc>,
    pub entity_count: usize,
    pub key_source: KeySource,
}

/// What a merge did to the local store
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub remote_device_id: Uuid,
    pub remote_modified: DateTime<Utc>,
    pub summary: MergeSummary,
    /// Human-readable change log
    pub changes: Vec<String>,
    /// False when the merged snapshot equalled the local one and nothing
    /// was written
    pub imported: bool,
    /// True while the relay's latest record lacks data this device holds.
    /// Cleared once the merged snapshot has been uploaded.
    pub relay_behind: bool,
}

/// Result of a successful download
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum DownloadOutcome {
    /// The relay has no record for this identity yet
    NoRemoteData,
    Merged(MergeReport),
}

/// Sync orchestrator
pub struct SyncOrchestrator {
    remote: Arc<dyn RemoteStore>,
    local: Arc<dyn LocalStore>,
    identity: Arc<dyn IdentityProvider>,
    state_store: Arc<dyn StateStore>,
    devices: DeviceRegistry,
    codec: EncryptionCodec,
    keys: Box<dyn KeyProvider>,
    logger: Option<Arc<LoggingService>>,
    timings: SyncTimings,
    format_version: String,
    relay_url: Option<String>,
    state: watch::Sender<SyncState>,
    /// Held for the whole of every cycle
    cycle: AsyncMutex<()>,
    /// Bumped by `disable_sync`; cycles started before it do not record results
    epoch: AtomicU64,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl SyncOrchestrator {
    /// Create an orchestrator, restoring its state from persisted flags
    pub fn new(ports: SyncPorts, settings: &SyncSettings) -> Result<Self> {
        let signature = settings
            .client_signature
            .clone()
            .unwrap_or_else(|| default_client_signature(env!("CARGO_PKG_NAME")));

        let enabled = ports.state.get_bool(state_keys::SYNC_ENABLED)?;
        let paused = ports.state.get_bool(state_keys::SYNC_PAUSED)?;
        let last_sync_time = ports
            .state
            .get(state_keys::LAST_SYNC_AT)?
            .and_then(|raw| match DateTime::parse_from_rfc3339(&raw) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(e) => {
                    warn!(error = %e, "Ignoring invalid last sync timestamp");
                    None
                }
            });

        let initial = SyncState {
            mode: if enabled {
                SyncMode::Enabled
            } else {
                SyncMode::Disabled
            },
            is_syncing: false,
            is_paused: paused,
            last_sync_time,
            error: None,
        };
        let (state, _) = watch::channel(initial);

        Ok(Self {
            devices: DeviceRegistry::new(ports.state.clone(), signature),
            remote: ports.remote,
            local: ports.local,
            identity: ports.identity,
            state_store: ports.state,
            codec: EncryptionCodec::new(settings.argon2.clone()),
            keys: Box::new(IdentityKeyProvider),
            logger: None,
            timings: settings.timings(),
            format_version: settings.format_version.clone(),
            relay_url: settings.relay_url.clone(),
            state,
            cycle: AsyncMutex::new(()),
            epoch: AtomicU64::new(0),
            scheduler: Mutex::new(None),
        })
    }

    pub fn with_codec(mut self, codec: EncryptionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_key_provider(mut self, keys: Box<dyn KeyProvider>) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_timings(mut self, timings: SyncTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Signature the device label is derived from on first use
    pub fn with_client_signature(mut self, signature: impl Into<String>) -> Self {
        self.devices = DeviceRegistry::new(self.state_store.clone(), signature);
        self
    }

    // === Observation ===

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn timings(&self) -> SyncTimings {
        self.timings
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub(crate) fn local(&self) -> &Arc<dyn LocalStore> {
        &self.local
    }

    /// Status summary for display
    pub fn status(&self) -> Result<SyncStatus> {
        let state = self.state();
        Ok(SyncStatus {
            phase: state.phase(),
            device: self
                .devices
                .device_info(state.last_sync_time, &self.format_version)?,
            authenticated: self.identity.is_authenticated(),
            relay_url: self.relay_url.clone(),
            state,
        })
    }

    // === Lifecycle ===

    /// Turn sync on.
    ///
    /// Waits (bounded) for a still-loading identity, runs the first cycle,
    /// persists the enabled flag and moves to Idle. A failed first cycle is
    /// recorded in the error overlay but does not stop enabling.
    pub async fn enable_sync(&self) -> Result<()> {
        self.enable_with(None).await
    }

    async fn enable_with(&self, passphrase: Option<&str>) -> Result<()> {
        if self.state.borrow().is_enabled() {
            return Ok(());
        }

        let identity = match self.wait_for_identity().await {
            Ok(identity) => identity,
            Err(e) => {
                self.record(LogEvent::new(events::SYNC_ENABLE_FAILED).with_error(e.to_string()));
                return Err(e);
            }
        };

        {
            let _cycle = self.cycle.lock().await;
            // Another caller may have enabled sync while this one waited
            if self.state.borrow().is_enabled() {
                return Ok(());
            }

            if let Err(e) = self.tracked(self.first_cycle(&identity, passphrase)).await {
                warn!(error = %e, "First sync cycle failed, sync enabled with a pending upload");
            }

            if let Err(e) = self.state_store.set_bool(state_keys::SYNC_ENABLED, true) {
                warn!(error = %e, "Failed to persist sync enabled flag");
            }
            self.state.send_modify(|s| s.mode = SyncMode::Enabled);
        }

        info!("Sync enabled");
        self.record(LogEvent::new(events::SYNC_ENABLED).with_device(self.devices.device_id()?));
        Ok(())
    }

    /// Turn sync off and forget every sync marker. Background tasks are told
    /// to stop. Never blocks on an in-flight cycle; its results are discarded.
    pub fn disable_sync(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        let scheduler = self.scheduler.lock().ok().and_then(|mut s| s.take());
        if let Some(handle) = scheduler {
            handle.signal_stop();
        }

        for key in [
            state_keys::SYNC_ENABLED,
            state_keys::LAST_SYNC_AT,
            state_keys::SYNC_PAUSED,
            state_keys::MANUAL_PASSPHRASE,
            state_keys::MANUAL_PASSPHRASE_SALT,
        ] {
            if let Err(e) = self.state_store.remove(key) {
                warn!(key, error = %e, "Failed to clear sync state");
            }
        }

        self.state.send_replace(SyncState::default());
        info!("Sync disabled");
        self.record(LogEvent::new(events::SYNC_DISABLED));
    }

    /// Suppress automatic cycles. Manual calls keep working.
    pub fn pause_sync(&self) -> Result<()> {
        self.set_paused(true)
    }

    pub fn resume_sync(&self) -> Result<()> {
        self.set_paused(false)
    }

    fn set_paused(&self, paused: bool) -> Result<()> {
        self.state_store.set_bool(state_keys::SYNC_PAUSED, paused)?;
        self.state.send_modify(|s| s.is_paused = paused);
        info!(paused, "Sync pause toggled");
        self.record(LogEvent::new(if paused {
            events::SYNC_PAUSED
        } else {
            events::SYNC_RESUMED
        }));
        Ok(())
    }

    /// Spawn the debounce and poll tasks. No-op when already running.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut scheduler = self
            .scheduler
            .lock()
            .map_err(|_| Error::Other("scheduler lock poisoned".into()))?;
        if scheduler.is_none() {
            *scheduler = Some(SchedulerHandle::spawn(Arc::clone(self)));
        }
        Ok(())
    }

    /// Stop the background tasks and wait for them to finish
    pub async fn shutdown(&self) {
        let handle = self.scheduler.lock().ok().and_then(|mut s| s.take());
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler
            .lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    // === Manual operations ===

    /// Encrypt the local snapshot and push it to the relay.
    ///
    /// Fails without side effects when sync is disabled or nobody is signed in.
    pub async fn upload_snapshot(&self, passphrase: Option<&str>) -> Result<UploadOutcome> {
        let _cycle = self.cycle.lock().await;
        if !self.state.borrow().is_enabled() {
            return Err(Error::NotEnabled);
        }
        let identity = self.identity.current().ok_or(Error::AuthRequired)?;
        self.tracked(self.upload_inner(&identity, passphrase)).await
    }

    /// Fetch the latest remote snapshot, merge it with the local one and
    /// write the result back. Enables sync first when disabled.
    ///
    /// When the merged data holds anything the relay's record lacks, the
    /// merged snapshot is uploaded in the same cycle.
    pub async fn download_and_merge(&self, passphrase: Option<&str>) -> Result<DownloadOutcome> {
        if !self.state.borrow().is_enabled() {
            self.enable_with(passphrase).await?;
        }

        let _cycle = self.cycle.lock().await;
        if !self.state.borrow().is_enabled() {
            return Err(Error::NotEnabled);
        }
        let identity = self.identity.current().ok_or(Error::AuthRequired)?;
        self.tracked(self.download_inner(&identity, passphrase)).await
    }

    /// Manual cross-device unlock with a passphrase.
    ///
    /// On success the passphrase is remembered, encrypted under a per-device
    /// key, and used for later cycles until sync is disabled.
    pub async fn unlock_with_passphrase(&self, passphrase: &str) -> Result<DownloadOutcome> {
        let outcome = match self.download_and_merge(Some(passphrase)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record(LogEvent::new(events::MANUAL_UNLOCK).with_error(e.to_string()));
                return Err(e);
            }
        };

        self.remember_passphrase(passphrase).await?;
        self.record(LogEvent::new(events::MANUAL_UNLOCK).with_key_source("explicit"));
        Ok(outcome)
    }

    // === Automatic cycles (driven by the scheduler) ===

    /// Whether background triggers may run a cycle right now
    pub(crate) fn automatic_allowed(&self) -> bool {
        let state = self.state.borrow();
        state.is_enabled() && !state.is_paused
    }

    /// Debounced cycle: upload, settle, then download if the relay is newer.
    ///
    /// Skipped when another cycle is in flight. Failures only land in the
    /// error overlay and the event log.
    pub(crate) async fn run_automatic_cycle(&self) {
        if !self.automatic_allowed() {
            return;
        }
        let Ok(_cycle) = self.cycle.try_lock() else {
            debug!("Cycle in flight, skipping debounced sync");
            return;
        };
        let Some(identity) = self.identity.current() else {
            debug!("No identity, skipping debounced sync");
            return;
        };

        if let Err(e) = self.tracked(self.upload_inner(&identity, None)).await {
            debug!(error = %e, "Automatic upload failed");
            return;
        }

        tokio::time::sleep(self.timings.settle_delay).await;
        self.download_if_newer(&identity).await;
    }

    /// Poll cycle: download if the relay is newer than the last sync
    pub(crate) async fn poll_once(&self) {
        if !self.automatic_allowed() {
            return;
        }
        let Ok(_cycle) = self.cycle.try_lock() else {
            debug!("Cycle in flight, skipping poll");
            return;
        };
        let Some(identity) = self.identity.current() else {
            return;
        };

        self.download_if_newer(&identity).await;
    }

    async fn download_if_newer(&self, identity: &Identity) {
        let latest = match self
            .with_deadline("freshness check", self.remote.latest_modified(&identity.id))
            .await
        {
            Ok(latest) => latest,
            Err(e) => {
                debug!(error = %e, "Freshness check failed");
                self.set_error(&e);
                return;
            }
        };

        let last_sync = self.state.borrow().last_sync_time;
        let newer = match (latest, last_sync) {
            (Some(remote), Some(local)) => remote > local,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !newer {
            return;
        }

        if let Err(e) = self.tracked(self.download_inner(identity, None)).await {
            debug!(error = %e, "Automatic download failed");
        }
    }

    // === Cycle bodies (caller holds `cycle`) ===

    /// First cycle of a newly enabled device: merge whatever the relay holds,
    /// then upload. The upload is skipped when the relay data cannot be
    /// merged, so an unreadable record is not buried under a newer one.
    async fn first_cycle(&self, identity: &Identity, passphrase: Option<&str>) -> Result<UploadOutcome> {
        self.fetch_and_merge(identity, passphrase).await?;
        self.upload_inner(identity, passphrase).await
    }

    async fn upload_inner(&self, identity: &Identity, passphrase: Option<&str>) -> Result<UploadOutcome> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let device_id = self.devices.device_id()?;
        let device_name = self.devices.device_name()?;

        let snapshot = SnapshotBuilder::build(self.local.as_ref())?;
        let plaintext = Zeroizing::new(snapshot.to_json_bytes()?);
        let (key, key_source) = self.resolve_key(identity, passphrase).await?;
        let payload = self.codec.seal(&plaintext, &key, &self.format_version)?;

        let result = self
            .with_deadline(
                "snapshot upload",
                self.remote.store_snapshot(&identity.id, device_id, &payload),
            )
            .await;
        let last_modified = match result {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "Upload failed");
                self.record(
                    LogEvent::new(events::UPLOAD_FAILED)
                        .with_device(device_id)
                        .with_error(e.to_string()),
                );
                return Err(e);
            }
        };

        if let Err(e) = self
            .with_deadline(
                "device metadata update",
                self.remote.update_device_metadata(
                    &identity.id,
                    device_id,
                    &device_name,
                    &self.format_version,
                ),
            )
            .await
        {
            warn!(error = %e, "Failed to update device metadata");
        }

        self.record_sync(epoch, last_modified);
        info!(
            entities = snapshot.entity_count(),
            bytes = payload.ciphertext.len(),
            "Snapshot uploaded"
        );
        self.record(
            LogEvent::new(events::UPLOAD_SUCCEEDED)
                .with_device(device_id)
                .with_key_source(key_source_name(key_source)),
        );

        Ok(UploadOutcome {
            last_modified,
            entity_count: snapshot.entity_count(),
            key_source,
        })
    }

    async fn download_inner(
        &self,
        identity: &Identity,
        passphrase: Option<&str>,
    ) -> Result<DownloadOutcome> {
        let mut outcome = self.fetch_and_merge(identity, passphrase).await?;

        if let DownloadOutcome::Merged(report) = &mut outcome {
            if report.relay_behind {
                debug!("Relay lacks local data, uploading the merged snapshot");
                match self.upload_inner(identity, passphrase).await {
                    Ok(_) => report.relay_behind = false,
                    Err(e) => warn!(error = %e, "Upload of the merged snapshot failed"),
                }
            }
        }
        Ok(outcome)
    }

    async fn fetch_and_merge(
        &self,
        identity: &Identity,
        passphrase: Option<&str>,
    ) -> Result<DownloadOutcome> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        match self.download_and_import(identity, passphrase, epoch).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(error = %e, "Download failed");
                let event = if matches!(e, Error::Import(_)) {
                    events::IMPORT_FAILED
                } else {
                    events::DOWNLOAD_FAILED
                };
                self.record(LogEvent::new(event).with_error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn download_and_import(
        &self,
        identity: &Identity,
        passphrase: Option<&str>,
        epoch: u64,
    ) -> Result<DownloadOutcome> {
        let record = self
            .with_deadline(
                "snapshot download",
                self.remote.fetch_latest_snapshot(&identity.id),
            )
            .await?;

        let Some(record) = record else {
            info!("No remote snapshot yet");
            self.record(LogEvent::new(events::DOWNLOAD_EMPTY));
            return Ok(DownloadOutcome::NoRemoteData);
        };

        let (key, key_source) = self.resolve_key(identity, passphrase).await?;
        let plaintext = Zeroizing::new(self.codec.open(&record.payload(), &key)?);
        let remote = Snapshot::from_json_bytes(&plaintext)
            .map_err(|e| Error::Integrity(format!("remote snapshot is not readable: {}", e)))?;

        let local = SnapshotBuilder::build_full(self.local.as_ref())?;
        let result = MergeEngine::merge(&local, &remote);
        MergeEngine::verify(&local, &remote, &result)?;

        let imported = differs_from(&result.merged, &local);
        let relay_behind = MergeEngine::remote_is_behind(&remote, &result.merged);
        if imported {
            self.local.import_snapshot(&result.merged).map_err(|e| match e {
                Error::Import(_) => e,
                other => Error::import(other.to_string()),
            })?;
        }

        self.record_sync(epoch, record.last_modified);

        let summary = result.summary();
        info!(
            remote_device = %record.device_id,
            added = summary.added,
            updated = summary.updated,
            imported,
            relay_behind,
            "Remote snapshot merged"
        );
        self.record(
            LogEvent::new(events::DOWNLOAD_SUCCEEDED)
                .with_device(record.device_id)
                .with_key_source(key_source_name(key_source)),
        );

        Ok(DownloadOutcome::Merged(MergeReport {
            remote_device_id: record.device_id,
            remote_modified: record.last_modified,
            summary,
            changes: result.descriptions(),
            imported,
            relay_behind,
        }))
    }

    // === Helpers ===

    /// Current identity, waiting a bounded time while the sign-in flow is
    /// still loading
    async fn wait_for_identity(&self) -> Result<Identity> {
        let deadline = Instant::now() + self.timings.auth_wait_timeout;
        loop {
            if let Some(identity) = self.identity.current() {
                return Ok(identity);
            }
            if !self.identity.is_loading() {
                return Err(Error::AuthRequired);
            }
            if Instant::now() >= deadline {
                return Err(Error::AuthNotReady);
            }
            tokio::time::sleep(self.timings.auth_poll_interval).await;
        }
    }

    /// Mark a cycle as in flight and record its outcome in the error overlay
    async fn tracked<T>(&self, cycle: impl Future<Output = Result<T>>) -> Result<T> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.state.send_modify(|s| s.is_syncing = true);

        let result = cycle.await;

        let current = self.epoch.load(Ordering::SeqCst) == epoch;
        self.state.send_modify(|s| {
            s.is_syncing = false;
            if current {
                s.error = result.as_ref().err().map(|e| e.to_string());
            }
        });
        result
    }

    fn set_error(&self, error: &Error) {
        let message = error.to_string();
        self.state.send_modify(|s| s.error = Some(message));
    }

    /// Record a successful sync at the relay's timestamp
    fn record_sync(&self, epoch: u64, at: DateTime<Utc>) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Sync disabled during cycle, discarding result");
            return;
        }
        if let Err(e) = self.state_store.set(state_keys::LAST_SYNC_AT, &at.to_rfc3339()) {
            warn!(error = %e, "Failed to persist last sync time");
        }
        self.state.send_modify(|s| s.last_sync_time = Some(at));
    }

    async fn with_deadline<T>(&self, what: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timings.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::network(format!(
                "{} timed out after {:?}",
                what, self.timings.request_timeout
            ))),
        }
    }

    /// Passphrase for a cycle: explicit argument, else the remembered manual
    /// passphrase, else the key provider
    async fn resolve_key(
        &self,
        identity: &Identity,
        explicit: Option<&str>,
    ) -> Result<(SyncKey, KeySource)> {
        let (passphrase, source) = match explicit {
            Some(p) => (Zeroizing::new(p.to_string()), KeySource::Explicit),
            None => match self.remembered_passphrase().await {
                Some(p) => (p, KeySource::Remembered),
                None => (self.keys.passphrase(identity)?, self.keys.source()),
            },
        };

        let salt = EncryptionCodec::identity_salt(&identity.id);
        let key = self.derive_key(passphrase, salt.to_vec()).await?;
        Ok((key, source))
    }

    /// Argon2 off the async worker threads
    async fn derive_key(&self, passphrase: Zeroizing<String>, salt: Vec<u8>) -> Result<SyncKey> {
        let codec = self.codec.clone();
        tokio::task::spawn_blocking(move || codec.derive_key(&passphrase, &salt))
            .await
            .map_err(|e| Error::Other(format!("Key derivation task failed: {}", e)))?
    }

    async fn device_key(&self, salt: &[u8]) -> Result<SyncKey> {
        let device_id = self.devices.device_id()?;
        self.derive_key(Zeroizing::new(device_id.to_string()), salt.to_vec())
            .await
    }

    /// Store a manual passphrase encrypted under a per-device key
    async fn remember_passphrase(&self, passphrase: &str) -> Result<()> {
        let salt = EncryptionCodec::random_salt();
        let key = self.device_key(&salt).await?;
        let sealed = self.codec.encrypt(passphrase.as_bytes(), &key)?;

        let b64 = base64::engine::general_purpose::STANDARD;
        self.state_store
            .set(state_keys::MANUAL_PASSPHRASE_SALT, &b64.encode(salt))?;
        self.state_store
            .set(state_keys::MANUAL_PASSPHRASE, &b64.encode(sealed))?;
        debug!("Manual passphrase remembered");
        Ok(())
    }

    /// Remembered manual passphrase, if any and readable
    async fn remembered_passphrase(&self) -> Option<Zeroizing<String>> {
        let sealed = self.state_store.get(state_keys::MANUAL_PASSPHRASE).ok()??;
        let salt = self
            .state_store
            .get(state_keys::MANUAL_PASSPHRASE_SALT)
            .ok()??;

        let b64 = base64::engine::general_purpose::STANDARD;
        let (Ok(sealed), Ok(salt)) = (b64.decode(sealed), b64.decode(salt)) else {
            warn!("Remembered passphrase is not valid base64, ignoring it");
            return None;
        };

        let key = match self.device_key(&salt).await {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Cannot derive device key for remembered passphrase");
                return None;
            }
        };
        match self.codec.decrypt(&sealed, &key) {
            Ok(bytes) => String::from_utf8(bytes).ok().map(Zeroizing::new),
            Err(e) => {
                warn!(error = %e, "Remembered passphrase cannot be decrypted, ignoring it");
                None
            }
        }
    }

    /// Append to the event log; logging failures never affect a cycle
    fn record(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            if let Err(e) = logger.log(event) {
                debug!(error = %e, "Failed to write sync event log");
            }
        }
    }
}

fn key_source_name(source: KeySource) -> &'static str {
    match source {
        KeySource::Identity => "identity",
        KeySource::Passphrase => "passphrase",
        KeySource::Remembered => "remembered",
        KeySource::Explicit => "explicit",
    }
}

/// Whether the merged snapshot changes anything compared to local
fn differs_from(merged: &Snapshot, local: &Snapshot) -> bool {
    let mut normalized = merged.clone();
    normalized.exported_at = local.exported_at;
    normalized != *local
}
