//! Configuration management
//!
//! Sync settings live under the `"sync"` key of `settings.json` in the data
//! directory, shared with other front ends:
//! ```json
//! {
//!   "sync": { "relayUrl": "https://relay.example.com", "pollIntervalSecs": 10 },
//!   "app": { ... }
//! }
//! ```
//! Keys this crate does not manage are preserved when saving.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{Argon2Params, SNAPSHOT_FORMAT_VERSION};
use crate::services::SyncTimings;

/// Environment variable selecting the data directory
pub const ENV_DATA_DIR: &str = "FINSYNC_DIR";
pub const ENV_RELAY_URL: &str = "FINSYNC_RELAY_URL";
pub const ENV_POLL_INTERVAL_SECS: &str = "FINSYNC_POLL_INTERVAL_SECS";
pub const ENV_DEBOUNCE_MS: &str = "FINSYNC_DEBOUNCE_MS";

const SETTINGS_FILE: &str = "settings.json";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    sync: SyncSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_auth_poll_interval_ms() -> u64 {
    100
}

fn default_auth_wait_timeout_ms() -> u64 {
    5000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_format_version() -> String {
    SNAPSHOT_FORMAT_VERSION.to_string()
}

/// Sync settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    #[serde(default)]
    pub relay_url: Option<String>,
    /// Bearer token for the relay, if it requires one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_token: Option<String>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_auth_poll_interval_ms")]
    pub auth_poll_interval_ms: u64,
    #[serde(default = "default_auth_wait_timeout_ms")]
    pub auth_wait_timeout_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_format_version")]
    pub format_version: String,
    /// Overrides the signature the device label is derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_signature: Option<String>,
    #[serde(default)]
    pub argon2: Argon2Params,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            relay_url: None,
            relay_token: None,
            debounce_ms: default_debounce_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            auth_poll_interval_ms: default_auth_poll_interval_ms(),
            auth_wait_timeout_ms: default_auth_wait_timeout_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            format_version: default_format_version(),
            client_signature: None,
            argon2: Argon2Params::default(),
        }
    }
}

impl SyncSettings {
    /// Scheduler and deadline durations
    pub fn timings(&self) -> SyncTimings {
        SyncTimings {
            debounce: Duration::from_millis(self.debounce_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            auth_poll_interval: Duration::from_millis(self.auth_poll_interval_ms.max(1)),
            auth_wait_timeout: Duration::from_millis(self.auth_wait_timeout_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        }
    }

    /// Apply `FINSYNC_*` environment overrides
    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(url) = env(ENV_RELAY_URL).filter(|v| !v.trim().is_empty()) {
            self.relay_url = Some(url);
        }
        if let Some(secs) = env(ENV_POLL_INTERVAL_SECS).and_then(|v| v.trim().parse().ok()) {
            self.poll_interval_secs = secs;
        }
        if let Some(ms) = env(ENV_DEBOUNCE_MS).and_then(|v| v.trim().parse().ok()) {
            self.debounce_ms = ms;
        }
    }
}

/// Finsync configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub sync: SyncSettings,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Config {
    /// Load config from the data directory, then apply environment overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        let mut config = Self::load_file(data_dir)?;
        config.sync.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load config from the data directory only
    pub fn load_file(data_dir: &Path) -> Result<Self> {
        let raw = read_settings(&data_dir.join(SETTINGS_FILE))?;
        Ok(Self {
            sync: raw.sync.clone(),
            _raw_settings: raw,
        })
    }

    /// Save config to the data directory, preserving settings this crate
    /// doesn't manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings_path = data_dir.join(SETTINGS_FILE);
        let mut settings = read_settings(&settings_path)?;
        settings.sync = self.sync.clone();

        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }
}

fn read_settings(path: &Path) -> Result<SettingsFile> {
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&content).unwrap_or_default())
}

/// Data directory: `FINSYNC_DIR`, else `~/.finsync`
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".finsync")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = SyncSettings::default();
        let timings = settings.timings();
        assert_eq!(timings.debounce, Duration::from_secs(1));
        assert_eq!(timings.poll_interval, Duration::from_secs(10));
        assert_eq!(timings.auth_wait_timeout, Duration::from_secs(5));
        assert_eq!(settings.format_version, "1.0");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_file(dir.path()).unwrap();
        assert_eq!(config.sync, SyncSettings::default());
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"sync":{"relayUrl":"https://relay.example.com","pollIntervalSecs":30}}"#,
        )
        .unwrap();

        let config = Config::load_file(dir.path()).unwrap();
        assert_eq!(
            config.sync.relay_url.as_deref(),
            Some("https://relay.example.com")
        );
        assert_eq!(config.sync.poll_interval_secs, 30);
        assert_eq!(config.sync.debounce_ms, 1000);
    }

    #[test]
    fn test_save_preserves_unknown_keys() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"app":{"theme":"dark"},"sync":{"debounceMs":250}}"#,
        )
        .unwrap();

        let mut config = Config::load_file(dir.path()).unwrap();
        config.sync.relay_url = Some("https://relay.example.com".into());
        config.save(dir.path()).unwrap();

        let content = std::fs::read_to_string(dir.path().join(SETTINGS_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json["app"]["theme"], "dark");
        assert_eq!(json["sync"]["debounceMs"], 250);
        assert_eq!(json["sync"]["relayUrl"], "https://relay.example.com");
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = SyncSettings::default();
        settings.apply_env(|key| match key {
            ENV_RELAY_URL => Some("https://override.example.com".into()),
            ENV_POLL_INTERVAL_SECS => Some("60".into()),
            ENV_DEBOUNCE_MS => Some("not a number".into()),
            _ => None,
        });

        assert_eq!(
            settings.relay_url.as_deref(),
            Some("https://override.example.com")
        );
        assert_eq!(settings.poll_interval_secs, 60);
        assert_eq!(settings.debounce_ms, 1000);
    }
}
