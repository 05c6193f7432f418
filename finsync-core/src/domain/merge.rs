//! Merge result types

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Collection, Snapshot};

/// Which input a merged value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
}

/// A single change applied while merging, in the order it was applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MergeChange {
    Added { collection: Collection, id: Uuid },
    Updated { collection: Collection, id: Uuid },
    EmergencyFund { kept: Side, value: Decimal },
    ProfileMerged,
}

impl fmt::Display for MergeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeChange::Added { collection, id } => {
                write!(f, "Added {} {} from remote", collection.noun(), id)
            }
            MergeChange::Updated { collection, id } => {
                write!(f, "Updated {} {} with newer remote version", collection.noun(), id)
            }
            MergeChange::EmergencyFund { kept: Side::Local, value } => {
                write!(f, "Emergency fund: kept local value {}", value)
            }
            MergeChange::EmergencyFund { kept: Side::Remote, value } => {
                write!(f, "Emergency fund: took remote value {}", value)
            }
            MergeChange::ProfileMerged => f.write_str("Merged user profile"),
        }
    }
}

/// A concurrent edit that could not be resolved automatically.
///
/// Reserved: the current policy is silent last-writer-wins, so no conflict is
/// ever produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConflict {
    pub collection: Collection,
    pub id: Uuid,
    pub local_timestamp: i64,
    pub remote_timestamp: i64,
}

/// Output of the merge engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub merged: Snapshot,
    pub changes: Vec<MergeChange>,
    pub conflicts: Vec<MergeConflict>,
}

/// Counts of applied changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    pub added: usize,
    pub updated: usize,
    pub conflicts: usize,
}

impl MergeResult {
    /// Human-readable change log
    pub fn descriptions(&self) -> Vec<String> {
        self.changes.iter().map(|c| c.to_string()).collect()
    }

    pub fn summary(&self) -> MergeSummary {
        let mut summary = MergeSummary {
            conflicts: self.conflicts.len(),
            ..Default::default()
        };
        for change in &self.changes {
            match change {
                MergeChange::Added { .. } => summary.added += 1,
                MergeChange::Updated { .. } => summary.updated += 1,
                _ => {}
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_descriptions() {
        let id = Uuid::nil();
        let added = MergeChange::Added {
            collection: Collection::Transactions,
            id,
        };
        assert_eq!(
            added.to_string(),
            format!("Added transaction {} from remote", id)
        );

        let fund = MergeChange::EmergencyFund {
            kept: Side::Local,
            value: Decimal::new(500, 0),
        };
        assert_eq!(fund.to_string(), "Emergency fund: kept local value 500");
    }

    #[test]
    fn test_summary_counts() {
        let result = MergeResult {
            merged: Snapshot::default(),
            changes: vec![
                MergeChange::Added {
                    collection: Collection::Goals,
                    id: Uuid::new_v4(),
                },
                MergeChange::Updated {
                    collection: Collection::Goals,
                    id: Uuid::new_v4(),
                },
                MergeChange::EmergencyFund {
                    kept: Side::Local,
                    value: Decimal::ZERO,
                },
            ],
            conflicts: Vec::new(),
        };
        let summary = result.summary();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.conflicts, 0);
    }
}
