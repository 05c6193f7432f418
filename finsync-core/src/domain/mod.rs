//! Core domain entities
//!
//! All synchronizable entities and sync-state types are defined here. These
//! are pure data structures - no I/O or external dependencies.

mod budget;
pub mod category;
mod debt;
mod device;
mod encryption;
mod identity;
mod merge;
mod profile;
pub mod record;
pub mod result;
mod snapshot;
mod sync_state;
mod transaction;

pub use budget::{Budget, BudgetPeriod, Goal};
pub use category::Category;
pub use debt::{CreditAccount, DebtAccount, LedgerKind, LedgerTransaction};
pub use device::DeviceInfo;
pub use encryption::{
    Argon2Params, EncryptedPayload, RemoteRecord, SNAPSHOT_FORMAT_VERSION,
};
pub use identity::Identity;
pub use merge::{MergeChange, MergeConflict, MergeResult, MergeSummary, Side};
pub use profile::UserProfile;
pub use record::{RecordMeta, SyncRecord};
pub use snapshot::{Collection, Snapshot};
pub use sync_state::{SyncMode, SyncPhase, SyncState, SyncStatus};
pub use transaction::{Transaction, TransactionKind};
