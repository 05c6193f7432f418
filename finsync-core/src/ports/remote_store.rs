//! Remote store port - the untrusted relay

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{EncryptedPayload, RemoteRecord};

/// Relay that stores opaque ciphertext per (user, device).
///
/// The relay keeps one logical latest record per user; older records may be
/// retained for audit but only the latest takes part in sync.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Store a snapshot for this device.
    ///
    /// Returns the last-modified timestamp the relay assigned to the record.
    async fn store_snapshot(
        &self,
        user_id: &str,
        device_id: Uuid,
        payload: &EncryptedPayload,
    ) -> Result<DateTime<Utc>>;

    /// Fetch the most recent record for the user across all devices
    async fn fetch_latest_snapshot(&self, user_id: &str) -> Result<Option<RemoteRecord>>;

    /// Update this device's metadata on the relay
    async fn update_device_metadata(
        &self,
        user_id: &str,
        device_id: Uuid,
        device_name: &str,
        version: &str,
    ) -> Result<()>;

    /// Last-modified timestamp of the latest record, used for freshness checks.
    ///
    /// The default fetches the whole record; adapters with a cheaper endpoint
    /// should override it.
    async fn latest_modified(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .fetch_latest_snapshot(user_id)
            .await?
            .map(|record| record.last_modified))
    }
}
