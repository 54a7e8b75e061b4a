//! SQL migration definitions for the privaudit ledger database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: host_results ledger",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per audited domain. The hostname is indexed but deliberately not
-- UNIQUE: the dedup gate lives in the orchestrator, and insert stays a plain
-- INSERT rather than an upsert.
CREATE TABLE IF NOT EXISTS host_results (
    id         TEXT PRIMARY KEY,
    hostname   TEXT NOT NULL,
    results    TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_host_results_hostname ON host_results(hostname);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
