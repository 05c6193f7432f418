//! DuckDB local store
//!
//! Every synchronizable record is stored as a JSON body keyed by
//! (collection, id), with a position column that keeps insertion order.
//! Scalars (emergency fund, profile) live in a small name/value table.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::domain::category::with_local_defaults;
use crate::domain::result::{Error, Result};
use crate::domain::{
    Budget, Category, Collection, CreditAccount, DebtAccount, Goal, LedgerTransaction,
    Snapshot, SyncRecord, Transaction, UserProfile,
};
use crate::migrations::LOCAL_SCHEMA;
use crate::ports::LocalStore;
use crate::services::MigrationReport;

/// Maximum number of retries when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const SCALAR_EMERGENCY_FUND: &str = "emergency_fund";
const SCALAR_PROFILE: &str = "profile";

/// Whether an open error is a file lock held by another process
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

fn storage_error(e: anyhow::Error) -> Error {
    Error::storage(format!("{:#}", e))
}

/// Local store backed by a DuckDB file
pub struct DuckDbLocalStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    changes: watch::Sender<u64>,
}

impl DuckDbLocalStore {
    /// Open (or create) the database at `db_path` and run pending migrations.
    ///
    /// Retries with exponential backoff while another process holds the file.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => return Self::from_connection(conn, Some(db_path.to_path_buf())),
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            error = %err_msg,
                            "Database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// In-memory database, mainly for tests
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn try_open_connection(db_path: &Path) -> anyhow::Result<Connection> {
        // Extension autoloading off; JSON is statically linked via the "json" feature
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn from_connection(conn: Connection, db_path: Option<PathBuf>) -> anyhow::Result<Self> {
        LOCAL_SCHEMA.migrate(&conn)?;

        let (changes, _) = watch::channel(0);
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            changes,
        })
    }

    /// Run pending migrations again (no-op when up to date)
    pub fn run_migrations(&self) -> anyhow::Result<MigrationReport> {
        let conn = self.lock()?;
        LOCAL_SCHEMA.migrate(&conn)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    fn bump(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    // === Reads ===

    fn read_collection<T: DeserializeOwned>(&self, collection: Collection) -> anyhow::Result<Vec<T>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT body FROM sync_entities WHERE collection = ? ORDER BY position, id",
        )?;
        let bodies = stmt.query_map([collection.as_str()], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for body in bodies {
            let body = body?;
            records.push(
                serde_json::from_str(&body)
                    .with_context(|| format!("Corrupt {} record", collection.noun()))?,
            );
        }
        Ok(records)
    }

    fn read_scalar(&self, name: &str) -> anyhow::Result<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT value FROM sync_scalars WHERE name = ?")?;
        let mut rows = stmt.query([name])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn read<T>(&self, collection: Collection) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.read_collection(collection).map_err(storage_error)
    }

    // === Writes ===

    /// Insert or update a single record, bumping the change counter
    pub fn upsert<T: SyncRecord + Serialize>(&self, collection: Collection, record: &T) -> Result<()> {
        let body = serde_json::to_string(record)?;
        let id = record.id().to_string();
        {
            let conn = self.lock().map_err(storage_error)?;
            let updated = conn
                .execute(
                    "UPDATE sync_entities SET body = ? WHERE collection = ? AND id = ?",
                    params![body, collection.as_str(), id],
                )
                .map_err(|e| Error::storage(e.to_string()))?;

            if updated == 0 {
                let position: i64 = conn
                    .query_row(
                        "SELECT COALESCE(MAX(position) + 1, 0) FROM sync_entities WHERE collection = ?",
                        [collection.as_str()],
                        |row| row.get(0),
                    )
                    .map_err(|e| Error::storage(e.to_string()))?;
                conn.execute(
                    "INSERT INTO sync_entities (collection, id, position, body) VALUES (?, ?, ?, ?)",
                    params![collection.as_str(), id, position, body],
                )
                .map_err(|e| Error::storage(e.to_string()))?;
            }
        }
        self.bump();
        Ok(())
    }

    pub fn set_emergency_fund(&self, amount: Decimal) -> Result<()> {
        self.write_scalar(SCALAR_EMERGENCY_FUND, &serde_json::to_string(&amount)?)?;
        self.bump();
        Ok(())
    }

    pub fn set_profile(&self, profile: &UserProfile) -> Result<()> {
        self.write_scalar(SCALAR_PROFILE, &serde_json::to_string(profile)?)?;
        self.bump();
        Ok(())
    }

    fn write_scalar(&self, name: &str, value: &str) -> Result<()> {
        let conn = self.lock().map_err(storage_error)?;
        conn.execute(
            "INSERT OR REPLACE INTO sync_scalars (name, value) VALUES (?, ?)",
            params![name, value],
        )
        .map_err(|e| Error::storage(e.to_string()))?;
        Ok(())
    }

    fn replace_all(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let current_categories: Vec<Category> = self.read_collection(Collection::Categories)?;
        let categories = with_local_defaults(&current_categories, &snapshot.categories);

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM sync_entities", [])?;
        insert_all(&tx, Collection::Transactions, &snapshot.transactions)?;
        insert_all(&tx, Collection::Budgets, &snapshot.budgets)?;
        insert_all(&tx, Collection::Goals, &snapshot.goals)?;
        insert_all(&tx, Collection::DebtAccounts, &snapshot.debt_accounts)?;
        insert_all(&tx, Collection::CreditAccounts, &snapshot.credit_accounts)?;
        insert_all(&tx, Collection::DebtTransactions, &snapshot.debt_transactions)?;
        insert_all(&tx, Collection::CreditTransactions, &snapshot.credit_transactions)?;
        insert_all(&tx, Collection::Categories, &categories)?;

        tx.execute(
            "INSERT OR REPLACE INTO sync_scalars (name, value) VALUES (?, ?)",
            params![SCALAR_EMERGENCY_FUND, serde_json::to_string(&snapshot.emergency_fund)?],
        )?;
        match &snapshot.profile {
            Some(profile) => {
                tx.execute(
                    "INSERT OR REPLACE INTO sync_scalars (name, value) VALUES (?, ?)",
                    params![SCALAR_PROFILE, serde_json::to_string(profile)?],
                )?;
            }
            None => {
                tx.execute("DELETE FROM sync_scalars WHERE name = ?", [SCALAR_PROFILE])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

fn insert_all<T: SyncRecord + Serialize>(
    conn: &Connection,
    collection: Collection,
    records: &[T],
) -> anyhow::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO sync_entities (collection, id, position, body) VALUES (?, ?, ?, ?)",
    )?;
    let mut seen = std::collections::HashSet::new();
    for (position, record) in records.iter().enumerate() {
        if !seen.insert(record.id()) {
            continue;
        }
        stmt.execute(params![
            collection.as_str(),
            record.id().to_string(),
            position as i64,
            serde_json::to_string(record)?,
        ])?;
    }
    Ok(())
}

impl LocalStore for DuckDbLocalStore {
    fn transactions(&self) -> Result<Vec<Transaction>> {
        self.read(Collection::Transactions)
    }

    fn budgets(&self) -> Result<Vec<Budget>> {
        self.read(Collection::Budgets)
    }

    fn goals(&self) -> Result<Vec<Goal>> {
        self.read(Collection::Goals)
    }

    fn debt_accounts(&self) -> Result<Vec<DebtAccount>> {
        self.read(Collection::DebtAccounts)
    }

    fn credit_accounts(&self) -> Result<Vec<CreditAccount>> {
        self.read(Collection::CreditAccounts)
    }

    fn debt_transactions(&self) -> Result<Vec<LedgerTransaction>> {
        self.read(Collection::DebtTransactions)
    }

    fn credit_transactions(&self) -> Result<Vec<LedgerTransaction>> {
        self.read(Collection::CreditTransactions)
    }

    fn categories(&self) -> Result<Vec<Category>> {
        self.read(Collection::Categories)
    }

    fn emergency_fund(&self) -> Result<Decimal> {
        match self.read_scalar(SCALAR_EMERGENCY_FUND).map_err(storage_error)? {
            Some(value) => Ok(serde_json::from_str(&value)?),
            None => Ok(Decimal::ZERO),
        }
    }

    fn profile(&self) -> Result<Option<UserProfile>> {
        match self.read_scalar(SCALAR_PROFILE).map_err(storage_error)? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    fn import_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.replace_all(snapshot)
            .map_err(|e| Error::import(format!("{:#}", e)))?;
        self.bump();
        debug!(entities = snapshot.entity_count(), "Imported snapshot into local store");
        Ok(())
    }

    fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::TempDir;
    use uuid::Uuid;

    use crate::domain::{LedgerKind, RecordMeta};

    fn tx(amount: i64) -> Transaction {
        Transaction::new(
            Decimal::new(amount, 0),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        )
        .with_description("coffee")
    }

    #[test]
    fn test_upsert_and_read_back_in_order() {
        let store = DuckDbLocalStore::open_in_memory().unwrap();
        let first = tx(1);
        let second = tx(2);
        store.upsert(Collection::Transactions, &first).unwrap();
        store.upsert(Collection::Transactions, &second).unwrap();

        let mut edited = first.clone();
        edited.amount = Decimal::new(10, 0);
        edited.meta = RecordMeta::modified_at(Utc.timestamp_millis_opt(99).unwrap());
        store.upsert(Collection::Transactions, &edited).unwrap();

        assert_eq!(store.transactions().unwrap(), vec![edited, second]);
        assert!(store.budgets().unwrap().is_empty());
    }

    #[test]
    fn test_scalars_default_and_persist() {
        let store = DuckDbLocalStore::open_in_memory().unwrap();
        assert_eq!(store.emergency_fund().unwrap(), Decimal::ZERO);
        assert!(store.profile().unwrap().is_none());

        store.set_emergency_fund(Decimal::new(12345, 2)).unwrap();
        let profile = UserProfile {
            display_name: Some("Ana".into()),
            ..Default::default()
        };
        store.set_profile(&profile).unwrap();

        assert_eq!(store.emergency_fund().unwrap(), Decimal::new(12345, 2));
        assert_eq!(store.profile().unwrap(), Some(profile));
    }

    #[test]
    fn test_import_replaces_contents_and_keeps_defaults() {
        let store = DuckDbLocalStore::open_in_memory().unwrap();
        let food = Category::default_category(Uuid::from_u128(1), "Food");
        store.upsert(Collection::Categories, &food).unwrap();
        store.upsert(Collection::Transactions, &tx(5)).unwrap();

        let mut incoming = Snapshot::default();
        incoming.transactions = vec![tx(7), tx(8)];
        incoming.debt_transactions = vec![LedgerTransaction::new(
            Uuid::new_v4(),
            Decimal::new(50, 0),
            LedgerKind::Charge,
            NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
        )];
        incoming.categories = vec![Category::custom("Pets")];
        incoming.emergency_fund = Decimal::new(900, 0);

        let rx = store.subscribe_changes();
        let before = *rx.borrow();
        store.import_snapshot(&incoming).unwrap();
        assert!(*rx.borrow() > before);

        assert_eq!(store.transactions().unwrap(), incoming.transactions);
        assert_eq!(store.debt_transactions().unwrap(), incoming.debt_transactions);
        let categories = store.categories().unwrap();
        assert_eq!(categories.len(), 2);
        assert!(categories.contains(&food));
        assert_eq!(store.emergency_fund().unwrap(), Decimal::new(900, 0));
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("finsync.duckdb");
        let record = tx(3);
        {
            let store = DuckDbLocalStore::open(&path).unwrap();
            store.upsert(Collection::Transactions, &record).unwrap();
        }

        let store = DuckDbLocalStore::open(&path).unwrap();
        assert_eq!(store.transactions().unwrap(), vec![record]);
        assert!(store.run_migrations().unwrap().applied.is_empty());
    }
}
