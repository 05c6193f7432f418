//! Device identity registry
//!
//! Generates a random device id and a human-readable label on first use and
//! persists both; every later call returns the stored values verbatim, so the
//! registry is idempotent across restarts.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::DeviceInfo;
use crate::ports::{state_keys, StateStore};

/// Client families, checked in order (Edge and Opera identify as Chrome too)
const CLIENT_PATTERNS: &[(&str, &str)] = &[
    (r"(?i)\bedg(e|a|ios)?/", "Edge"),
    (r"(?i)\b(opr|opera)/", "Opera"),
    (r"(?i)\bfirefox/|\bfxios/", "Firefox"),
    (r"(?i)\bchrome/|\bcrios/", "Chrome"),
    (r"(?i)\bsafari/", "Safari"),
    (r"(?i)\bfinsync-cli/", "CLI"),
    (r"(?i)\bfinsync-desktop/", "Desktop App"),
];

/// OS families, checked in order (Android reports Linux too)
const OS_PATTERNS: &[(&str, &str)] = &[
    (r"(?i)\bandroid\b", "Android"),
    (r"(?i)\b(iphone|ipad|ipod|ios)\b", "iOS"),
    (r"(?i)\bwindows\b", "Windows"),
    (r"(?i)\b(mac ?os|macintosh|darwin)\b", "macOS"),
    (r"(?i)\bcros\b", "ChromeOS"),
    (r"(?i)\blinux\b", "Linux"),
];

const FALLBACK_CLIENT: &str = "Client";
const FALLBACK_OS: &str = "Unknown OS";

fn compiled(patterns: &'static [(&'static str, &'static str)]) -> Vec<(Regex, &'static str)> {
    patterns
        .iter()
        .filter_map(|(pattern, label)| match Regex::new(pattern) {
            Ok(re) => Some((re, *label)),
            Err(e) => {
                warn!(pattern, error = %e, "Skipping invalid device pattern");
                None
            }
        })
        .collect()
}

fn client_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| compiled(CLIENT_PATTERNS))
}

fn os_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| compiled(OS_PATTERNS))
}

fn first_match(signature: &str, patterns: &[(Regex, &'static str)], fallback: &'static str) -> &'static str {
    patterns
        .iter()
        .find(|(re, _)| re.is_match(signature))
        .map(|(_, label)| *label)
        .unwrap_or(fallback)
}

/// Best-effort label such as "Firefox on Linux" from a client signature
/// (a user-agent style string)
pub fn device_label(signature: &str) -> String {
    let client = first_match(signature, client_patterns(), FALLBACK_CLIENT);
    let os = first_match(signature, os_patterns(), FALLBACK_OS);
    format!("{} on {}", client, os)
}

/// Signature of this build, e.g. `finsync-cli/0.1.0 (linux)`
pub fn default_client_signature(client: &str) -> String {
    format!(
        "{}/{} ({})",
        client,
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

/// Registry for this device's stable identity
pub struct DeviceRegistry {
    state: Arc<dyn StateStore>,
    client_signature: String,
}

impl DeviceRegistry {
    pub fn new(state: Arc<dyn StateStore>, client_signature: impl Into<String>) -> Self {
        Self {
            state,
            client_signature: client_signature.into(),
        }
    }

    /// Stable device id, generated on first call
    pub fn device_id(&self) -> Result<Uuid> {
        if let Some(stored) = self.state.get(state_keys::DEVICE_ID)? {
            match Uuid::parse_str(&stored) {
                Ok(id) => return Ok(id),
                Err(e) => warn!(error = %e, "Stored device id is invalid, generating a new one"),
            }
        }

        let id = Uuid::new_v4();
        self.state.set(state_keys::DEVICE_ID, &id.to_string())?;
        info!(device_id = %id, "Registered new device id");
        Ok(id)
    }

    /// Stable device label, synthesized on first call
    pub fn device_name(&self) -> Result<String> {
        if let Some(name) = self.state.get(state_keys::DEVICE_NAME)? {
            if !name.trim().is_empty() {
                return Ok(name);
            }
        }

        let name = device_label(&self.client_signature);
        self.state.set(state_keys::DEVICE_NAME, &name)?;
        Ok(name)
    }

    /// Override the stored label
    pub fn rename(&self, name: &str) -> Result<()> {
        self.state.set(state_keys::DEVICE_NAME, name.trim())
    }

    pub fn device_info(&self, last_sync_at: Option<DateTime<Utc>>, sync_version: &str) -> Result<DeviceInfo> {
        Ok(DeviceInfo {
            device_id: self.device_id()?,
            device_name: self.device_name()?,
            last_sync_at,
            sync_version: sync_version.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStateStore;

    #[test]
    fn test_device_label_heuristics() {
        let cases = [
            (
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
                "Chrome on Windows",
            ),
            (
                "Mozilla/5.0 (Windows NT 10.0) AppleWebKit/537.36 Chrome/120.0 Safari/537.36 Edg/120.0",
                "Edge on Windows",
            ),
            (
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 Version/17.2 Safari/605.1.15",
                "Safari on macOS",
            ),
            (
                "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
                "Firefox on Linux",
            ),
            (
                "Mozilla/5.0 (Linux; Android 14) AppleWebKit/537.36 Chrome/120.0 Mobile Safari/537.36",
                "Chrome on Android",
            ),
            ("finsync-cli/0.1.0 (linux)", "CLI on Linux"),
            ("something else entirely", "Client on Unknown OS"),
        ];

        for (signature, expected) in cases {
            assert_eq!(device_label(signature), expected, "signature: {}", signature);
        }
    }

    #[test]
    fn test_device_id_is_stable() {
        let state = Arc::new(MemoryStateStore::new());
        let registry = DeviceRegistry::new(state.clone(), "finsync-cli/0.1.0 (linux)");

        let first = registry.device_id().unwrap();
        let second = registry.device_id().unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.device_name().unwrap(), "CLI on Linux");

        // A new registry over the same state (process restart) reuses it
        let restarted = DeviceRegistry::new(state, "different signature");
        assert_eq!(restarted.device_id().unwrap(), first);
        assert_eq!(restarted.device_name().unwrap(), "CLI on Linux");
    }

    #[test]
    fn test_invalid_stored_id_is_replaced() {
        let state = Arc::new(MemoryStateStore::new());
        state.set(state_keys::DEVICE_ID, "not-a-uuid").unwrap();

        let registry = DeviceRegistry::new(state.clone(), "x");
        let id = registry.device_id().unwrap();
        assert_eq!(
            state.get(state_keys::DEVICE_ID).unwrap(),
            Some(id.to_string())
        );
    }

    #[test]
    fn test_rename() {
        let state = Arc::new(MemoryStateStore::new());
        let registry = DeviceRegistry::new(state, "x");
        registry.rename("  Kitchen laptop ").unwrap();
        assert_eq!(registry.device_name().unwrap(), "Kitchen laptop");
    }
}
