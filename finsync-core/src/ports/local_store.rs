//! Local store port - the device's transactional data store

use rust_decimal::Decimal;
use tokio::sync::watch;

use crate::domain::result::Result;
use crate::domain::{
    Budget, Category, CreditAccount, DebtAccount, Goal, LedgerTransaction, Snapshot,
    Transaction, UserProfile,
};

/// Local data store the snapshot is read from and merged results are written to.
///
/// Reads are synchronous. Every mutation must bump the change counter exposed
/// by `subscribe_changes`, which is what the background scheduler debounces on.
pub trait LocalStore: Send + Sync {
    fn transactions(&self) -> Result<Vec<Transaction>>;

    fn budgets(&self) -> Result<Vec<Budget>>;

    fn goals(&self) -> Result<Vec<Goal>>;

    fn debt_accounts(&self) -> Result<Vec<DebtAccount>>;

    fn credit_accounts(&self) -> Result<Vec<CreditAccount>>;

    fn debt_transactions(&self) -> Result<Vec<LedgerTransaction>>;

    fn credit_transactions(&self) -> Result<Vec<LedgerTransaction>>;

    /// All categories, default ones included
    fn categories(&self) -> Result<Vec<Category>>;

    fn emergency_fund(&self) -> Result<Decimal>;

    fn profile(&self) -> Result<Option<UserProfile>>;

    /// Replace local contents with the given snapshot.
    ///
    /// Default categories already present locally are left untouched.
    fn import_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Monotonic change counter, bumped on every local mutation
    fn subscribe_changes(&self) -> watch::Receiver<u64>;
}
