//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core library error type
///
/// Every sync operation reports failure through one of these variants rather
/// than panicking. `is_transient` tells callers whether the next scheduled
/// cycle can be expected to recover on its own.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication is still initializing")]
    AuthNotReady,

    #[error("Authentication required")]
    AuthRequired,

    #[error("Sync is not enabled")]
    NotEnabled,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Merge error: {0}")]
    Merge(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an encryption error
    pub fn encryption(msg: impl Into<String>) -> Self {
        Self::Encryption(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create an import error
    pub fn import(msg: impl Into<String>) -> Self {
        Self::Import(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether the next debounce or poll cycle may recover from this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AuthNotReady
                | Self::Encryption(_)
                | Self::Integrity(_)
                | Self::Network(_)
                | Self::Import(_)
                | Self::Storage(_)
        )
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for front-end serialization)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Attach a context value
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                let transient = e.is_transient();
                Self::fail(e.to_string()).with_context("transient", serde_json::Value::Bool(transient))
            }
        }
    }
}
