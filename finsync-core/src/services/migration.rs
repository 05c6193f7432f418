//! Schema migrations for the DuckDB files
//!
//! A [`Schema`] is an ordered list of embedded SQL files whose first entry
//! creates `sys_migrations`. Each file runs in its own transaction together
//! with the row that records it, so a failed file leaves nothing behind and
//! is retried on the next open.

use anyhow::{anyhow, bail, Context, Result};
use duckdb::Connection;
use tracing::info;

/// Name of the file that creates `sys_migrations`
pub const BOOKKEEPING: &str = "000_migrations.sql";

/// One database's migration set
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    /// Shown in logs and errors
    pub label: &'static str,
    /// `(file name, sql)`, in application order
    pub migrations: &'static [(&'static str, &'static str)],
}

/// What a migration run did
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    /// Files that were already recorded before this run
    pub up_to_date: usize,
}

impl Schema {
    /// Apply every file not yet recorded in `sys_migrations`
    pub fn migrate(&self, conn: &Connection) -> Result<MigrationReport> {
        self.check_order()?;
        let (bookkeeping, rest) = self
            .migrations
            .split_first()
            .ok_or_else(|| anyhow!("{} schema has no migrations", self.label))?;

        let mut report = MigrationReport::default();
        let mut recorded = self.recorded(conn)?;
        if recorded.is_empty() {
            self.apply(conn, bookkeeping)?;
            report.applied.push(bookkeeping.0.to_string());
            recorded.push(bookkeeping.0.to_string());
        }

        for migration in rest {
            if recorded.iter().any(|name| name == migration.0) {
                continue;
            }
            self.apply(conn, migration)?;
            report.applied.push(migration.0.to_string());
        }

        report.up_to_date = self.migrations.len() - report.applied.len();
        Ok(report)
    }

    /// File names not yet applied
    pub fn pending(&self, conn: &Connection) -> Result<Vec<&'static str>> {
        let recorded = self.recorded(conn)?;
        Ok(self
            .migrations
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| !recorded.iter().any(|r| r == name))
            .collect())
    }

    /// Names in `sys_migrations`; empty when the table does not exist yet
    fn recorded(&self, conn: &Connection) -> Result<Vec<String>> {
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare("SELECT migration_name FROM sys_migrations")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn apply(&self, conn: &Connection, (name, sql): &(&'static str, &'static str)) -> Result<()> {
        conn.execute_batch("BEGIN TRANSACTION")?;
        let result = conn
            .execute_batch(sql)
            .and_then(|()| {
                conn.execute(
                    "INSERT INTO sys_migrations (migration_name) VALUES (?)",
                    [*name],
                )
            })
            .and_then(|_| conn.execute_batch("COMMIT"));

        if let Err(e) = result {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e).with_context(|| format!("{} migration {} failed", self.label, name));
        }
        info!(schema = self.label, migration = *name, "Applied migration");
        Ok(())
    }

    /// The bookkeeping file comes first and names strictly increase
    fn check_order(&self) -> Result<()> {
        if let Some((first, _)) = self.migrations.first() {
            if *first != BOOKKEEPING {
                bail!("{} schema must start with {}", self.label, BOOKKEEPING);
            }
        }
        for pair in self.migrations.windows(2) {
            if pair[0].0 >= pair[1].0 {
                bail!(
                    "{} schema lists {} before {}",
                    self.label,
                    pair[0].0,
                    pair[1].0
                );
            }
        }
        Ok(())
    }
}
