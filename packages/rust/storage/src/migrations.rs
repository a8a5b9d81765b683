//! SQL migration definitions for the leadqual record store.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: records keyed by (table, identity)",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per logical record; fields are a JSON object
CREATE TABLE IF NOT EXISTS records (
    id           TEXT PRIMARY KEY,
    table_name   TEXT NOT NULL,
    identity     TEXT NOT NULL,
    identity_key TEXT NOT NULL,
    fields_json  TEXT NOT NULL DEFAULT '{}',
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    UNIQUE(table_name, identity_key)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Index records by last update for status listings",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_records_updated ON records(table_name, updated_at);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
