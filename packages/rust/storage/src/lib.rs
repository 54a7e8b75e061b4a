//! libSQL result ledger.
//!
//! The [`Ledger`] is the pipeline's idempotency gate and persistence sink:
//! one row per audited domain, keyed by hostname, holding the opaque audit
//! result text. Existence of a row is a terminal "already audited" marker —
//! this crate never updates or deletes entries.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use uuid::Uuid;

use privaudit_shared::{AuditError, Result};

/// A ledger row as returned by [`Ledger::list_entries`].
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub hostname: String,
    pub created_at: String,
}

/// Persistent store of already-audited domains.
pub struct Ledger {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Ledger {
    /// Open or create a ledger database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AuditError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        let ledger = Self { db, conn };
        ledger.run_migrations().await?;
        Ok(ledger)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    AuditError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Whether `host` already has a ledger row. Side-effect-free.
    pub async fn is_processed(&self, host: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM host_results WHERE hostname = ?1 LIMIT 1",
                params![host],
            )
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(AuditError::Storage(e.to_string())),
        }
    }

    /// Insert a new result row and return the affected row count.
    ///
    /// Not an upsert: calling this twice for the same host creates a
    /// duplicate row. The orchestrator alone enforces at-most-once by
    /// checking [`Ledger::is_processed`] first.
    pub async fn insert_result(&self, host: &str, result_text: &str) -> Result<u64> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let rows = self
            .conn
            .execute(
                "INSERT INTO host_results (id, hostname, results, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), host, result_text, now.as_str()],
            )
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;
        Ok(rows)
    }

    /// Total number of ledger rows (used by tests and the CLI summary).
    pub async fn row_count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM host_results", params![])
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row
                .get::<u64>(0)
                .map_err(|e| AuditError::Storage(e.to_string()))?),
            Ok(None) => Ok(0),
            Err(e) => Err(AuditError::Storage(e.to_string())),
        }
    }

    /// List all audited hostnames, newest first.
    pub async fn list_entries(&self) -> Result<Vec<LedgerEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT hostname, created_at FROM host_results ORDER BY created_at DESC",
                params![],
            )
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(LedgerEntry {
                hostname: row
                    .get::<String>(0)
                    .map_err(|e| AuditError::Storage(e.to_string()))?,
                created_at: row
                    .get::<String>(1)
                    .map_err(|e| AuditError::Storage(e.to_string()))?,
            });
        }
        Ok(results)
    }

    /// Fetch the stored result text for a host, if any.
    pub async fn get_result(&self, host: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT results FROM host_results WHERE hostname = ?1 LIMIT 1",
                params![host],
            )
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row.get::<String>(0)
                    .map_err(|e| AuditError::Storage(e.to_string()))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(AuditError::Storage(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file ledger for testing.
    async fn test_ledger() -> Ledger {
        let tmp = std::env::temp_dir().join(format!("privaudit_test_{}.db", Uuid::now_v7()));
        Ledger::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let ledger = test_ledger().await;
        assert_eq!(ledger.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("privaudit_test_{}.db", Uuid::now_v7()));
        let first = Ledger::open(&tmp).await.expect("first open");
        drop(first);
        let second = Ledger::open(&tmp).await.expect("second open");
        assert_eq!(second.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn processed_gate_round_trip() {
        let ledger = test_ledger().await;

        assert!(!ledger.is_processed("example.test").await.expect("check"));

        let rows = ledger
            .insert_result("example.test", r#"{"scorecard":{"total_score":20}}"#)
            .await
            .expect("insert");
        assert_eq!(rows, 1);

        assert!(ledger.is_processed("example.test").await.expect("check"));
        assert_eq!(ledger.row_count().await.expect("count"), 1);

        let stored = ledger.get_result("example.test").await.expect("get");
        assert!(stored.expect("row").contains("total_score"));
    }

    #[tokio::test]
    async fn check_is_side_effect_free() {
        let ledger = test_ledger().await;
        for _ in 0..3 {
            assert!(!ledger.is_processed("example.test").await.expect("check"));
        }
        assert_eq!(ledger.row_count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn insert_is_not_an_upsert() {
        // Bypassing the is_processed gate duplicates the row; the gate is
        // the orchestrator's job, not the storage layer's.
        let ledger = test_ledger().await;
        ledger.insert_result("example.test", "first").await.expect("insert");
        ledger.insert_result("example.test", "second").await.expect("insert");
        assert_eq!(ledger.row_count().await.expect("count"), 2);
    }

    #[tokio::test]
    async fn list_entries_returns_hostnames() {
        let ledger = test_ledger().await;
        ledger.insert_result("a.test", "{}").await.expect("insert");
        ledger.insert_result("b.test", "{}").await.expect("insert");

        let entries = ledger.list_entries().await.expect("list");
        assert_eq!(entries.len(), 2);
        let hosts: Vec<_> = entries.iter().map(|e| e.hostname.as_str()).collect();
        assert!(hosts.contains(&"a.test"));
        assert!(hosts.contains(&"b.test"));
    }
}
