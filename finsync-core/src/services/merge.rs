//! Merge engine - reconciles a local and a remote snapshot
//!
//! Per-collection policy:
//! - ids only present locally are kept, in local order
//! - ids only present remotely are appended, in remote order ("added")
//! - ids on both sides take the remote entry only when its timestamp is
//!   strictly greater ("updated"); ties keep local
//! - ledger collections (debt/credit transactions) are append-only: existing
//!   entries are never overwritten
//! - default categories never come from the remote side; local ones pass
//!   through unchanged
//! - the emergency fund is the larger of the two values
//! - the profile is a shallow overlay of remote onto local
//!
//! The engine is pure and deterministic. Merging a snapshot with itself
//! returns that snapshot unchanged.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Category, Collection, MergeChange, MergeResult, Side, Snapshot, SyncRecord,
};

/// Snapshot merge engine
pub struct MergeEngine;

impl MergeEngine {
    /// Merge `remote` into `local`
    pub fn merge(local: &Snapshot, remote: &Snapshot) -> MergeResult {
        let mut changes = Vec::new();

        let transactions = merge_latest(
            Collection::Transactions,
            &local.transactions,
            &remote.transactions,
            &mut changes,
        );
        let budgets = merge_latest(Collection::Budgets, &local.budgets, &remote.budgets, &mut changes);
        let goals = merge_latest(Collection::Goals, &local.goals, &remote.goals, &mut changes);
        let debt_accounts = merge_latest(
            Collection::DebtAccounts,
            &local.debt_accounts,
            &remote.debt_accounts,
            &mut changes,
        );
        let credit_accounts = merge_latest(
            Collection::CreditAccounts,
            &local.credit_accounts,
            &remote.credit_accounts,
            &mut changes,
        );
        let debt_transactions = merge_append_only(
            Collection::DebtTransactions,
            &local.debt_transactions,
            &remote.debt_transactions,
            &mut changes,
        );
        let credit_transactions = merge_append_only(
            Collection::CreditTransactions,
            &local.credit_transactions,
            &remote.credit_transactions,
            &mut changes,
        );
        let categories = merge_categories(&local.categories, &remote.categories, &mut changes);

        let (emergency_fund, kept) = if remote.emergency_fund > local.emergency_fund {
            (remote.emergency_fund, Side::Remote)
        } else {
            (local.emergency_fund, Side::Local)
        };
        changes.push(MergeChange::EmergencyFund {
            kept,
            value: emergency_fund,
        });

        let profile = match (&local.profile, &remote.profile) {
            (Some(l), Some(r)) => {
                changes.push(MergeChange::ProfileMerged);
                Some(l.overlay(r))
            }
            (None, Some(r)) => {
                changes.push(MergeChange::ProfileMerged);
                Some(r.clone())
            }
            (Some(l), None) => Some(l.clone()),
            (None, None) => None,
        };

        MergeResult {
            merged: Snapshot {
                transactions,
                budgets,
                goals,
                debt_accounts,
                credit_accounts,
                debt_transactions,
                credit_transactions,
                categories,
                emergency_fund,
                profile,
                exported_at: local.exported_at.max(remote.exported_at),
            },
            changes,
            conflicts: Vec::new(),
        }
    }

    /// Check that no entity from either input went missing.
    ///
    /// The merge policy only ever adds, so a failure here means a bug; the
    /// orchestrator refuses to import a result that fails this check.
    pub fn verify(local: &Snapshot, remote: &Snapshot, result: &MergeResult) -> Result<()> {
        let merged = &result.merged;
        for collection in Collection::ALL {
            let expected = expected_ids(collection, local, remote);
            let actual: HashSet<Uuid> = ids_of(collection, merged).into_iter().collect();
            if let Some(missing) = expected.iter().find(|id| !actual.contains(id)) {
                return Err(Error::Merge(format!(
                    "{} {} was dropped while merging",
                    collection.noun(),
                    missing
                )));
            }
        }

        if merged.emergency_fund < local.emergency_fund.max(remote.emergency_fund) {
            return Err(Error::Merge("emergency fund decreased while merging".into()));
        }

        Ok(())
    }

    /// Whether `merged` holds something the `remote` snapshot lacks: an entry
    /// it has never seen, a newer version of one, a larger emergency fund or
    /// extra profile fields.
    ///
    /// When this holds, the relay's latest record is missing local data and
    /// the merged snapshot has to be uploaded again.
    pub fn remote_is_behind(remote: &Snapshot, merged: &Snapshot) -> bool {
        let merged = merged.without_default_categories();
        let remote = remote.without_default_categories();

        let collections = [
            behind(Collection::Transactions, &remote.transactions, &merged.transactions),
            behind(Collection::Budgets, &remote.budgets, &merged.budgets),
            behind(Collection::Goals, &remote.goals, &merged.goals),
            behind(Collection::DebtAccounts, &remote.debt_accounts, &merged.debt_accounts),
            behind(
                Collection::CreditAccounts,
                &remote.credit_accounts,
                &merged.credit_accounts,
            ),
            behind(
                Collection::DebtTransactions,
                &remote.debt_transactions,
                &merged.debt_transactions,
            ),
            behind(
                Collection::CreditTransactions,
                &remote.credit_transactions,
                &merged.credit_transactions,
            ),
            behind(Collection::Categories, &remote.categories, &merged.categories),
        ];

        collections.into_iter().any(|b| b)
            || merged.emergency_fund > remote.emergency_fund
            || (merged.profile.is_some() && merged.profile != remote.profile)
    }
}

/// Entries of `merged` that `remote` is missing or only has an older copy of.
/// Ledger entries are never replaced, so only their ids count.
fn behind<T: SyncRecord>(collection: Collection, remote: &[T], merged: &[T]) -> bool {
    let remote_by_id = index_by_id(remote);
    merged.iter().any(|item| match remote_by_id.get(&item.id()) {
        None => true,
        Some(_) if collection.is_append_only() => false,
        Some(theirs) => item.merge_timestamp() > theirs.merge_timestamp(),
    })
}

/// Ids that must survive the merge for a collection
fn expected_ids(collection: Collection, local: &Snapshot, remote: &Snapshot) -> HashSet<Uuid> {
    let mut ids: HashSet<Uuid> = ids_of(collection, local).into_iter().collect();
    if collection == Collection::Categories {
        ids.extend(remote.categories.iter().filter(|c| !c.is_default).map(|c| c.id));
    } else {
        ids.extend(ids_of(collection, remote));
    }
    ids
}

fn ids_of(collection: Collection, snapshot: &Snapshot) -> Vec<Uuid> {
    fn ids<T: SyncRecord>(items: &[T]) -> Vec<Uuid> {
        items.iter().map(|item| item.id()).collect()
    }

    match collection {
        Collection::Transactions => ids(&snapshot.transactions),
        Collection::Budgets => ids(&snapshot.budgets),
        Collection::Goals => ids(&snapshot.goals),
        Collection::DebtAccounts => ids(&snapshot.debt_accounts),
        Collection::CreditAccounts => ids(&snapshot.credit_accounts),
        Collection::DebtTransactions => ids(&snapshot.debt_transactions),
        Collection::CreditTransactions => ids(&snapshot.credit_transactions),
        Collection::Categories => ids(&snapshot.categories),
    }
}

/// First occurrence of each id
fn index_by_id<T: SyncRecord>(items: &[T]) -> HashMap<Uuid, &T> {
    let mut index = HashMap::with_capacity(items.len());
    for item in items {
        index.entry(item.id()).or_insert(item);
    }
    index
}

/// Append remote entries whose id is not yet in `seen`
fn append_remote_only<T: SyncRecord>(
    collection: Collection,
    remote: &[T],
    seen: &mut HashSet<Uuid>,
    merged: &mut Vec<T>,
    changes: &mut Vec<MergeChange>,
) {
    for item in remote {
        let id = item.id();
        if seen.insert(id) {
            merged.push(item.clone());
            changes.push(MergeChange::Added { collection, id });
        }
    }
}

/// Last-writer-wins by merge timestamp, local wins ties
fn merge_latest<T: SyncRecord>(
    collection: Collection,
    local: &[T],
    remote: &[T],
    changes: &mut Vec<MergeChange>,
) -> Vec<T> {
    let remote_by_id = index_by_id(remote);
    let mut merged = Vec::with_capacity(local.len().max(remote.len()));
    let mut seen = HashSet::with_capacity(local.len());

    for item in local {
        let id = item.id();
        seen.insert(id);
        match remote_by_id.get(&id) {
            Some(theirs) if theirs.merge_timestamp() > item.merge_timestamp() => {
                merged.push((*theirs).clone());
                changes.push(MergeChange::Updated { collection, id });
            }
            _ => merged.push(item.clone()),
        }
    }

    append_remote_only(collection, remote, &mut seen, &mut merged, changes);
    merged
}

/// Ledger policy: add missing entries, never overwrite existing ones
fn merge_append_only<T: SyncRecord>(
    collection: Collection,
    local: &[T],
    remote: &[T],
    changes: &mut Vec<MergeChange>,
) -> Vec<T> {
    let mut merged = local.to_vec();
    let mut seen: HashSet<Uuid> = local.iter().map(|item| item.id()).collect();
    append_remote_only(collection, remote, &mut seen, &mut merged, changes);
    merged
}

/// Categories: local defaults pass through untouched, remote defaults are
/// discarded, user-created ones follow last-writer-wins
fn merge_categories(
    local: &[Category],
    remote: &[Category],
    changes: &mut Vec<MergeChange>,
) -> Vec<Category> {
    let collection = Collection::Categories;
    let remote_custom: Vec<Category> = remote.iter().filter(|c| !c.is_default).cloned().collect();
    let remote_by_id = index_by_id(&remote_custom);

    let mut merged = Vec::with_capacity(local.len() + remote_custom.len());
    let mut seen = HashSet::with_capacity(local.len());

    for category in local {
        seen.insert(category.id);
        if category.is_default {
            merged.push(category.clone());
            continue;
        }
        match remote_by_id.get(&category.id) {
            Some(theirs) if theirs.merge_timestamp() > category.merge_timestamp() => {
                merged.push((*theirs).clone());
                changes.push(MergeChange::Updated {
                    collection,
                    id: category.id,
                });
            }
            _ => merged.push(category.clone()),
        }
    }

    append_remote_only(collection, &remote_custom, &mut seen, &mut merged, changes);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::domain::{
        Budget, LedgerKind, LedgerTransaction, RecordMeta, Transaction, UserProfile,
    };

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn tx(n: u128, amount: i64, at: i64) -> Transaction {
        let mut t = Transaction::new(
            Decimal::new(amount, 0),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        t.id = id(n);
        t.meta = RecordMeta::modified_at(ts(at));
        t
    }

    fn ledger(n: u128, amount: i64, at: i64) -> LedgerTransaction {
        let mut entry = LedgerTransaction::new(
            id(999),
            Decimal::new(amount, 0),
            LedgerKind::Payment,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        entry.id = id(n);
        entry.meta = RecordMeta::modified_at(ts(at));
        entry
    }

    fn snapshot() -> Snapshot {
        Snapshot::empty_at(ts(0))
    }

    #[test]
    fn test_scenario_update_and_add() {
        let mut local = snapshot();
        local.transactions = vec![tx(1, 10, 5)];

        let mut remote = snapshot();
        remote.transactions = vec![tx(1, 12, 9), tx(2, 3, 1)];

        let result = MergeEngine::merge(&local, &remote);
        assert_eq!(result.merged.transactions, vec![tx(1, 12, 9), tx(2, 3, 1)]);

        let summary = result.summary();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.added, 1);
        assert!(result.changes.contains(&MergeChange::Updated {
            collection: Collection::Transactions,
            id: id(1)
        }));
        assert!(result.changes.contains(&MergeChange::Added {
            collection: Collection::Transactions,
            id: id(2)
        }));
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn test_equal_timestamps_keep_local() {
        let mut local = snapshot();
        local.transactions = vec![tx(1, 10, 7)];
        let mut remote = snapshot();
        remote.transactions = vec![tx(1, 99, 7)];

        let result = MergeEngine::merge(&local, &remote);
        assert_eq!(result.merged.transactions[0].amount, Decimal::new(10, 0));
        assert_eq!(result.summary().updated, 0);
    }

    #[test]
    fn test_older_remote_is_ignored() {
        let mut local = snapshot();
        local.budgets = vec![{
            let mut b = Budget::new("Food", Decimal::new(300, 0));
            b.id = id(5);
            b.meta = RecordMeta::modified_at(ts(100));
            b
        }];
        let mut remote = snapshot();
        remote.budgets = vec![{
            let mut b = local.budgets[0].clone();
            b.limit = Decimal::new(999, 0);
            b.meta = RecordMeta::modified_at(ts(50));
            b
        }];

        let result = MergeEngine::merge(&local, &remote);
        assert_eq!(result.merged.budgets, local.budgets);
    }

    #[test]
    fn test_timestamp_fallback_is_used_for_tie_break() {
        let mut local_tx = tx(1, 10, 0);
        local_tx.meta = RecordMeta {
            last_modified: None,
            updated_at: None,
            created_at: Some(ts(50)),
        };
        let mut remote_tx = tx(1, 20, 0);
        remote_tx.meta = RecordMeta {
            last_modified: None,
            updated_at: Some(ts(60)),
            created_at: Some(ts(10)),
        };

        let mut local = snapshot();
        local.transactions = vec![local_tx];
        let mut remote = snapshot();
        remote.transactions = vec![remote_tx.clone()];

        let result = MergeEngine::merge(&local, &remote);
        assert_eq!(result.merged.transactions, vec![remote_tx]);
    }

    #[test]
    fn test_ledger_entries_are_never_overwritten() {
        let mut local = snapshot();
        local.debt_transactions = vec![ledger(1, 100, 1)];
        local.credit_transactions = vec![ledger(10, 5, 1)];

        let mut remote = snapshot();
        remote.debt_transactions = vec![ledger(1, 999, 50), ledger(2, 40, 2)];
        remote.credit_transactions = vec![ledger(11, 7, 3)];

        let result = MergeEngine::merge(&local, &remote);
        assert_eq!(
            result.merged.debt_transactions,
            vec![ledger(1, 100, 1), ledger(2, 40, 2)]
        );
        assert_eq!(
            result.merged.credit_transactions,
            vec![ledger(10, 5, 1), ledger(11, 7, 3)]
        );
        assert_eq!(result.summary().updated, 0);
        assert_eq!(result.summary().added, 2);
    }

    #[test]
    fn test_default_categories() {
        let local_default = Category::default_category(id(1), "Food");
        let mut remote_default = Category::default_category(id(1), "Food (renamed)");
        remote_default.meta = RecordMeta::modified_at(ts(1_000));
        let remote_only_default = Category::default_category(id(2), "Remote default");
        let mut remote_custom = Category::custom("Pets");
        remote_custom.id = id(3);

        let mut local = snapshot();
        local.categories = vec![local_default.clone()];
        let mut remote = snapshot();
        remote.categories = vec![remote_default, remote_only_default, remote_custom.clone()];

        let result = MergeEngine::merge(&local, &remote);
        assert_eq!(result.merged.categories, vec![local_default, remote_custom]);
    }

    #[test]
    fn test_custom_categories_follow_last_writer_wins() {
        let mut mine = Category::custom("Hobby");
        mine.id = id(7);
        mine.meta = RecordMeta::modified_at(ts(10));
        let mut theirs = mine.clone();
        theirs.name = "Hobbies".into();
        theirs.meta = RecordMeta::modified_at(ts(20));

        let mut local = snapshot();
        local.categories = vec![mine];
        let mut remote = snapshot();
        remote.categories = vec![theirs.clone()];

        let result = MergeEngine::merge(&local, &remote);
        assert_eq!(result.merged.categories, vec![theirs]);
    }

    #[test]
    fn test_emergency_fund_keeps_larger_value() {
        let mut local = snapshot();
        local.emergency_fund = Decimal::new(500, 0);
        let mut remote = snapshot();
        remote.emergency_fund = Decimal::new(300, 0);

        let result = MergeEngine::merge(&local, &remote);
        assert_eq!(result.merged.emergency_fund, Decimal::new(500, 0));
        assert!(result.changes.contains(&MergeChange::EmergencyFund {
            kept: Side::Local,
            value: Decimal::new(500, 0)
        }));

        let result = MergeEngine::merge(&remote, &local);
        assert_eq!(result.merged.emergency_fund, Decimal::new(500, 0));
        assert!(result.changes.contains(&MergeChange::EmergencyFund {
            kept: Side::Remote,
            value: Decimal::new(500, 0)
        }));
    }

    #[test]
    fn test_profile_overlay() {
        let mut local = snapshot();
        local.profile = Some(UserProfile {
            display_name: Some("Local".into()),
            currency: Some("USD".into()),
            last_modified: Some(ts(200)),
            ..Default::default()
        });
        let mut remote = snapshot();
        remote.profile = Some(UserProfile {
            currency: Some("GBP".into()),
            last_modified: Some(ts(100)),
            ..Default::default()
        });

        let merged = MergeEngine::merge(&local, &remote).merged.profile.unwrap();
        assert_eq!(merged.display_name.as_deref(), Some("Local"));
        assert_eq!(merged.currency.as_deref(), Some("GBP"));
        assert_eq!(merged.last_modified, Some(ts(200)));

        let only_remote = MergeEngine::merge(&snapshot(), &remote).merged.profile;
        assert_eq!(only_remote, remote.profile);
    }

    fn rich_snapshot() -> Snapshot {
        let mut s = snapshot();
        s.transactions = vec![tx(1, 10, 5), tx(2, 20, 6)];
        s.budgets = vec![Budget::new("Rent", Decimal::new(1200, 0))];
        s.debt_transactions = vec![ledger(3, 50, 1)];
        s.categories = vec![
            Category::custom("Pets"),
            Category::default_category(id(40), "Food"),
            Category::custom("Travel"),
        ];
        s.emergency_fund = Decimal::new(750, 0);
        s.profile = Some(UserProfile {
            display_name: Some("Sam".into()),
            ..Default::default()
        });
        s.exported_at = ts(1_234);
        s
    }

    #[test]
    fn test_merge_with_itself_is_identity() {
        let s = rich_snapshot();
        let result = MergeEngine::merge(&s, &s);
        assert_eq!(result.merged, s);
        assert_eq!(result.summary().added, 0);
        assert_eq!(result.summary().updated, 0);
        assert!(!MergeEngine::remote_is_behind(&s, &result.merged));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let local = rich_snapshot();
        let mut remote = snapshot();
        remote.transactions = vec![tx(2, 25, 60), tx(8, 1, 1), tx(9, 2, 2)];
        remote.emergency_fund = Decimal::new(900, 0);

        let a = MergeEngine::merge(&local, &remote);
        let b = MergeEngine::merge(&local, &remote);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_vec(&a.merged).unwrap(),
            serde_json::to_vec(&b.merged).unwrap()
        );
    }

    #[test]
    fn test_nothing_is_dropped() {
        let local = rich_snapshot();
        let mut remote = rich_snapshot();
        remote.transactions.push(tx(77, 1, 1));
        remote.categories.push(Category::default_category(id(41), "Remote only default"));

        let result = MergeEngine::merge(&local, &remote);
        MergeEngine::verify(&local, &remote, &result).unwrap();

        // Every non-default entity from either side is present
        for t in local.transactions.iter().chain(remote.transactions.iter()) {
            assert!(result.merged.transactions.iter().any(|m| m.id == t.id));
        }
        assert!(!result.merged.categories.iter().any(|c| c.id == id(41)));
    }

    #[test]
    fn test_verify_detects_dropped_entity() {
        let local = rich_snapshot();
        let remote = snapshot();
        let mut result = MergeEngine::merge(&local, &remote);
        result.merged.transactions.pop();

        assert!(matches!(
            MergeEngine::verify(&local, &remote, &result),
            Err(Error::Merge(_))
        ));
    }

    #[test]
    fn test_duplicate_remote_ids_are_added_once() {
        let local = snapshot();
        let mut remote = snapshot();
        remote.transactions = vec![tx(1, 1, 1), tx(1, 2, 2)];

        let result = MergeEngine::merge(&local, &remote);
        assert_eq!(result.merged.transactions, vec![tx(1, 1, 1)]);
    }

    #[test]
    fn test_remote_missing_local_entry_is_behind() {
        let mut local = snapshot();
        local.transactions = vec![tx(1, 10, 5)];
        let mut remote = snapshot();
        remote.transactions = vec![tx(2, 20, 5)];

        let result = MergeEngine::merge(&local, &remote);
        assert!(MergeEngine::remote_is_behind(&remote, &result.merged));

        // Once the union is on the relay, the next merge has nothing to push
        let again = MergeEngine::merge(&result.merged, &result.merged);
        assert!(!MergeEngine::remote_is_behind(&result.merged, &again.merged));
    }

    #[test]
    fn test_remote_with_older_copy_is_behind() {
        let mut local = snapshot();
        local.transactions = vec![tx(1, 10, 9)];
        let mut remote = snapshot();
        remote.transactions = vec![tx(1, 12, 5)];

        let result = MergeEngine::merge(&local, &remote);
        assert!(MergeEngine::remote_is_behind(&remote, &result.merged));

        // Newer remote copy: merged takes it and the relay is current
        let result = MergeEngine::merge(&remote, &local);
        assert!(!MergeEngine::remote_is_behind(&local, &result.merged));
    }

    #[test]
    fn test_diverged_ledger_entry_is_not_behind() {
        let mut local = snapshot();
        local.debt_transactions = vec![ledger(1, 50, 1)];
        let mut remote = snapshot();
        remote.debt_transactions = vec![ledger(1, 5, 9)];

        let result = MergeEngine::merge(&local, &remote);
        assert!(!MergeEngine::remote_is_behind(&remote, &result.merged));
    }

    #[test]
    fn test_default_categories_and_fund_in_behind_check() {
        let mut local = snapshot();
        local.categories = vec![Category::default_category(id(40), "Food")];
        let remote = snapshot();

        // Defaults never travel, so they do not make the relay stale
        let result = MergeEngine::merge(&local, &remote);
        assert!(!MergeEngine::remote_is_behind(&remote, &result.merged));

        local.emergency_fund = Decimal::new(100, 0);
        let result = MergeEngine::merge(&local, &remote);
        assert!(MergeEngine::remote_is_behind(&remote, &result.merged));
    }
}
