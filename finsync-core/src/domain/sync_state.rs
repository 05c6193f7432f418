//! Orchestrator state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeviceInfo;

/// High-level sync mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Disabled,
    Enabled,
}

/// Observable phase, derived from the mode and its flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Disabled,
    Idle,
    Syncing,
    Paused,
}

/// Mutable orchestrator state: one mode plus two orthogonal flags and an
/// optional error overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub mode: SyncMode,
    pub is_syncing: bool,
    pub is_paused: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SyncState {
    pub fn is_enabled(&self) -> bool {
        self.mode == SyncMode::Enabled
    }

    pub fn phase(&self) -> SyncPhase {
        match self.mode {
            SyncMode::Disabled => SyncPhase::Disabled,
            SyncMode::Enabled if self.is_syncing => SyncPhase::Syncing,
            SyncMode::Enabled if self.is_paused => SyncPhase::Paused,
            SyncMode::Enabled => SyncPhase::Idle,
        }
    }
}

/// Status summary for display
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub state: SyncState,
    pub device: DeviceInfo,
    pub authenticated: bool,
    pub relay_url: Option<String>,
}
