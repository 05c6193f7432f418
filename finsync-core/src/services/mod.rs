//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

pub mod device;
pub mod encryption;
pub mod keys;
pub mod logging;
pub mod merge;
pub mod migration;
mod orchestrator;
mod scheduler;
mod snapshot;

pub use device::{default_client_signature, device_label, DeviceRegistry};
pub use encryption::{EncryptionCodec, SyncKey};
pub use keys::{IdentityKeyProvider, KeyProvider, KeySource, PassphraseKeyProvider};
pub use logging::{EntryPoint, EventTally, LogEntry, LogEvent, LoggingService};
pub use merge::MergeEngine;
pub use migration::{MigrationReport, Schema};
pub use orchestrator::{
    DownloadOutcome, MergeReport, SyncOrchestrator, SyncPorts, SyncTimings, UploadOutcome,
};
pub use snapshot::SnapshotBuilder;
