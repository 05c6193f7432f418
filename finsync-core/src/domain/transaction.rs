//! Transaction domain model

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::{impl_sync_record, RecordMeta};

/// Direction of money movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

/// A single income or expense entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub amount: Decimal,
    pub kind: TransactionKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Transaction {
    /// Create a new expense with a fresh id
    pub fn new(amount: Decimal, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            kind: TransactionKind::Expense,
            description: None,
            category_id: None,
            date,
            meta: RecordMeta::now(),
        }
    }

    pub fn with_kind(mut self, kind: TransactionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Signed amount: positive for income, negative for expenses
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionKind::Income => self.amount,
            TransactionKind::Expense => -self.amount,
        }
    }
}

impl_sync_record!(Transaction);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_amount() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let expense = Transaction::new(Decimal::new(1250, 2), date);
        assert_eq!(expense.signed_amount(), Decimal::new(-1250, 2));

        let income = expense.clone().with_kind(TransactionKind::Income);
        assert_eq!(income.signed_amount(), Decimal::new(1250, 2));
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let tx = Transaction::new(Decimal::new(500, 2), date).with_category(Uuid::nil());
        let json = serde_json::to_value(&tx).unwrap();
        assert!(json.get("categoryId").is_some());
        assert!(json.get("lastModified").is_some());
        assert_eq!(json["kind"], "expense");
    }
}
