//! Snapshot construction from the local store

use chrono::Utc;
use tracing::debug;

use crate::domain::result::Result;
use crate::domain::Snapshot;
use crate::ports::LocalStore;

/// Builds snapshots as views over the local store
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Snapshot as it is sent over the wire: default categories removed
    pub fn build(local: &dyn LocalStore) -> Result<Snapshot> {
        Ok(Self::build_full(local)?.without_default_categories())
    }

    /// Snapshot of everything in the local store, default categories included.
    ///
    /// This is the local side of a merge.
    pub fn build_full(local: &dyn LocalStore) -> Result<Snapshot> {
        let snapshot = Snapshot {
            transactions: local.transactions()?,
            budgets: local.budgets()?,
            goals: local.goals()?,
            debt_accounts: local.debt_accounts()?,
            credit_accounts: local.credit_accounts()?,
            debt_transactions: local.debt_transactions()?,
            credit_transactions: local.credit_transactions()?,
            categories: local.categories()?,
            emergency_fund: local.emergency_fund()?,
            profile: local.profile()?,
            exported_at: Utc::now(),
        };
        debug!(entities = snapshot.entity_count(), "Built local snapshot");
        Ok(snapshot)
    }
}
