//! Persisted key-value state port

use crate::domain::result::Result;

/// Small key-value store for sync flags and markers.
///
/// Writes to distinct keys are independent; there is no cross-key
/// transaction.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    fn get_bool(&self, key: &str) -> Result<bool> {
        Ok(matches!(self.get(key)?.as_deref(), Some("true")))
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, if value { "true" } else { "false" })
    }
}

/// Keys used by the sync engine
pub mod keys {
    pub const SYNC_ENABLED: &str = "sync_enabled";
    pub const LAST_SYNC_AT: &str = "last_sync_at";
    pub const DEVICE_ID: &str = "device_id";
    pub const DEVICE_NAME: &str = "device_name";
    pub const SYNC_PAUSED: &str = "sync_paused";
    pub const MANUAL_PASSPHRASE: &str = "manual_passphrase";
    pub const MANUAL_PASSPHRASE_SALT: &str = "manual_passphrase_salt";
}
