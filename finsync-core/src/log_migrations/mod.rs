//! Event log schema, applied to `logs.duckdb`

use crate::services::Schema;

pub const LOG_SCHEMA: Schema = Schema {
    label: "event log",
    migrations: &[
        ("000_migrations.sql", include_str!("000_migrations.sql")),
        ("001_sync_log.sql", include_str!("001_sync_log.sql")),
    ],
};
