//! Snapshot aggregate: everything that syncs between devices

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    Budget, Category, CreditAccount, DebtAccount, Goal, LedgerTransaction, Transaction,
    UserProfile,
};

/// Named collections inside a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Transactions,
    Budgets,
    Goals,
    DebtAccounts,
    CreditAccounts,
    DebtTransactions,
    CreditTransactions,
    Categories,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::Transactions,
        Collection::Budgets,
        Collection::Goals,
        Collection::DebtAccounts,
        Collection::CreditAccounts,
        Collection::DebtTransactions,
        Collection::CreditTransactions,
        Collection::Categories,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Transactions => "transactions",
            Collection::Budgets => "budgets",
            Collection::Goals => "goals",
            Collection::DebtAccounts => "debtAccounts",
            Collection::CreditAccounts => "creditAccounts",
            Collection::DebtTransactions => "debtTransactions",
            Collection::CreditTransactions => "creditTransactions",
            Collection::Categories => "categories",
        }
    }

    /// Singular noun for change descriptions
    pub fn noun(&self) -> &'static str {
        match self {
            Collection::Transactions => "transaction",
            Collection::Budgets => "budget",
            Collection::Goals => "goal",
            Collection::DebtAccounts => "debt account",
            Collection::CreditAccounts => "credit account",
            Collection::DebtTransactions => "debt transaction",
            Collection::CreditTransactions => "credit transaction",
            Collection::Categories => "category",
        }
    }

    /// Ledger collections never overwrite existing entries on merge
    pub fn is_append_only(&self) -> bool {
        matches!(
            self,
            Collection::DebtTransactions | Collection::CreditTransactions
        )
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full aggregate of a user's synchronizable data at a point in time.
///
/// A snapshot is a view: it is built fresh from the local store for every
/// upload or merge and never persisted as such.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub budgets: Vec<Budget>,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub debt_accounts: Vec<DebtAccount>,
    #[serde(default)]
    pub credit_accounts: Vec<CreditAccount>,
    #[serde(default)]
    pub debt_transactions: Vec<LedgerTransaction>,
    #[serde(default)]
    pub credit_transactions: Vec<LedgerTransaction>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub emergency_fund: Decimal,
    #[serde(default)]
    pub profile: Option<UserProfile>,
    pub exported_at: DateTime<Utc>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty_at(DateTime::<Utc>::default())
    }
}

impl Snapshot {
    /// An empty snapshot stamped with the given export time
    pub fn empty_at(exported_at: DateTime<Utc>) -> Self {
        Self {
            transactions: Vec::new(),
            budgets: Vec::new(),
            goals: Vec::new(),
            debt_accounts: Vec::new(),
            credit_accounts: Vec::new(),
            debt_transactions: Vec::new(),
            credit_transactions: Vec::new(),
            categories: Vec::new(),
            emergency_fund: Decimal::ZERO,
            profile: None,
            exported_at,
        }
    }

    /// Number of entries in a collection
    pub fn len_of(&self, collection: Collection) -> usize {
        match collection {
            Collection::Transactions => self.transactions.len(),
            Collection::Budgets => self.budgets.len(),
            Collection::Goals => self.goals.len(),
            Collection::DebtAccounts => self.debt_accounts.len(),
            Collection::CreditAccounts => self.credit_accounts.len(),
            Collection::DebtTransactions => self.debt_transactions.len(),
            Collection::CreditTransactions => self.credit_transactions.len(),
            Collection::Categories => self.categories.len(),
        }
    }

    /// Total entries across all collections
    pub fn entity_count(&self) -> usize {
        Collection::ALL.iter().map(|c| self.len_of(*c)).sum()
    }

    /// Copy of this snapshot with default categories removed, as sent over the wire
    pub fn without_default_categories(&self) -> Snapshot {
        let mut outgoing = self.clone();
        outgoing.categories.retain(|c| !c.is_default);
        outgoing
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> serde_json::Result<Snapshot> {
        serde_json::from_slice(bytes)
    }
}
