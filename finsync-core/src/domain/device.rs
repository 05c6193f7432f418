//! Device domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// This device, as registered with the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: Uuid,
    pub device_name: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Snapshot format version this device writes
    pub sync_version: String,
}
