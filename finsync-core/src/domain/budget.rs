//! Budget and savings goal domain models

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::{impl_sync_record, RecordMeta};

/// Budget period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    Weekly,
    #[default]
    Monthly,
    Yearly,
}

/// Spending limit for a category over a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub limit: Decimal,
    #[serde(default)]
    pub period: BudgetPeriod,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Budget {
    pub fn new(name: impl Into<String>, limit: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            category_id: None,
            limit,
            period: BudgetPeriod::default(),
            meta: RecordMeta::now(),
        }
    }
}

/// Savings goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: Uuid,
    pub name: String,
    pub target_amount: Decimal,
    #[serde(default)]
    pub current_amount: Decimal,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Goal {
    pub fn new(name: impl Into<String>, target_amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            target_amount,
            current_amount: Decimal::ZERO,
            deadline: None,
            meta: RecordMeta::now(),
        }
    }

    /// Fraction of the target reached, clamped to [0, 1]
    pub fn progress(&self) -> Decimal {
        if self.target_amount <= Decimal::ZERO {
            return Decimal::ONE;
        }
        (self.current_amount / self.target_amount).clamp(Decimal::ZERO, Decimal::ONE)
    }
}

impl_sync_record!(Budget, Goal);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_progress_is_clamped() {
        let mut goal = Goal::new("Vacation", Decimal::new(1000, 0));
        goal.current_amount = Decimal::new(250, 0);
        assert_eq!(goal.progress(), Decimal::new(25, 2));

        goal.current_amount = Decimal::new(5000, 0);
        assert_eq!(goal.progress(), Decimal::ONE);
    }

    #[test]
    fn test_budget_period_defaults_to_monthly() {
        let json = format!(
            r#"{{"id":"{}","name":"Food","limit":"300"}}"#,
            Uuid::new_v4()
        );
        let budget: Budget = serde_json::from_str(&json).unwrap();
        assert_eq!(budget.period, BudgetPeriod::Monthly);
    }
}
