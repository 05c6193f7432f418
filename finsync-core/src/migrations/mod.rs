//! Local store schema
//!
//! SQL files are compiled in with `include_str!`. To change the schema, add
//! `NNN_description.sql` next to this file and append it below.

use crate::services::Schema;

pub const LOCAL_SCHEMA: Schema = Schema {
    label: "local store",
    migrations: &[
        ("000_migrations.sql", include_str!("000_migrations.sql")),
        ("001_sync_entities.sql", include_str!("001_sync_entities.sql")),
    ],
};
