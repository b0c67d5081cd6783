//! System-table bootstrap.
//!
//! Tracks applied system-table versions in `_meta_version` and runs any
//! missing ones every time a database is opened.

use crate::ddl::MIGRATIONS;
use crate::error::{MetaError, MetaResult};
use crate::timestamp;
use cm_db::{Adapter, Tx};

fn ensure_version_table(tx: &Tx<'_>) -> MetaResult<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS _meta_version (
             version   INTEGER NOT NULL,
             appliedAt TEXT NOT NULL
         );",
    )
    .map_err(|e| MetaError::Bootstrap(format!("failed to create _meta_version: {e}")))
}

fn current_version(tx: &Tx<'_>) -> MetaResult<i32> {
    let version = tx
        .query_row("SELECT COALESCE(MAX(version), 0) FROM _meta_version", [], |row| {
            row.get::<_, i32>(0)
        })
        .map_err(|e| MetaError::Bootstrap(format!("failed to read _meta_version: {e}")))?;
    Ok(version.unwrap_or(0))
}

/// Create or upgrade the system tables. Idempotent.
///
/// Runs in a single transaction, so a crash leaves either the old or the new
/// system schema.
pub fn bootstrap(adapter: &Adapter) -> MetaResult<()> {
    adapter.transaction(|tx| {
        ensure_version_table(tx)?;
        let current = current_version(tx)?;

        for migration in MIGRATIONS {
            if migration.version <= current {
                continue;
            }
            log::debug!("Applying system tables v{:03}", migration.version);
            tx.execute_batch(migration.sql).map_err(|e| {
                MetaError::Bootstrap(format!("v{:03} failed: {e}", migration.version))
            })?;
            tx.exec(
                "INSERT INTO _meta_version (version, appliedAt) VALUES (?1, ?2)",
                rusqlite::params![migration.version, timestamp::now()],
            )
            .map_err(|e| {
                MetaError::Bootstrap(format!(
                    "failed to record v{:03}: {e}",
                    migration.version
                ))
            })?;
        }
        Ok(())
    })
}
