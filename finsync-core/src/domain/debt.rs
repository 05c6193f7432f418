//! Debt and credit account domain models

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::{impl_sync_record, RecordMeta};

/// A loan or other debt being paid down
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtAccount {
    pub id: Uuid,
    pub name: String,
    pub balance: Decimal,
    #[serde(default)]
    pub interest_rate: Option<Decimal>,
    #[serde(default)]
    pub minimum_payment: Option<Decimal>,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl DebtAccount {
    pub fn new(name: impl Into<String>, balance: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            balance,
            interest_rate: None,
            minimum_payment: None,
            meta: RecordMeta::now(),
        }
    }
}

/// A revolving credit line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditAccount {
    pub id: Uuid,
    pub name: String,
    pub credit_limit: Decimal,
    pub balance: Decimal,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl CreditAccount {
    pub fn new(name: impl Into<String>, credit_limit: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            credit_limit,
            balance: Decimal::ZERO,
            meta: RecordMeta::now(),
        }
    }

    pub fn available_credit(&self) -> Decimal {
        self.credit_limit - self.balance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Charge,
    Payment,
}

/// Ledger entry against a debt or credit account.
///
/// Ledger entries are immutable once recorded; the merge engine only ever
/// appends them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub kind: LedgerKind,
    pub date: NaiveDate,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl LedgerTransaction {
    pub fn new(account_id: Uuid, amount: Decimal, kind: LedgerKind, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            amount,
            kind,
            date,
            note: None,
            meta: RecordMeta::now(),
        }
    }
}

impl_sync_record!(DebtAccount, CreditAccount, LedgerTransaction);
