//! The `_migrations` ledger.

use crate::dao::Dao;
use crate::error::{MetaError, MetaResult};
use crate::timestamp;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

/// One applied migration step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub id: i64,
    pub file: String,
    #[serde(rename = "appliedAt")]
    pub applied_at: String,
}

/// Applied steps in ascending id order.
pub fn applied_migrations(conn: &Connection) -> MetaResult<Vec<MigrationRecord>> {
    let mut stmt = conn.prepare("SELECT id, file, appliedAt FROM _migrations ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(MigrationRecord {
                id: row.get(0)?,
                file: row.get(1)?,
                applied_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Highest applied id.
pub fn max_applied(conn: &Connection) -> MetaResult<Option<i64>> {
    let max = conn
        .query_row("SELECT MAX(id) FROM _migrations", [], |row| {
            row.get::<_, Option<i64>>(0)
        })
        .optional()?;
    Ok(max.flatten())
}

impl Dao<'_> {
    pub fn applied_migrations(&self) -> MetaResult<Vec<MigrationRecord>> {
        applied_migrations(self.tx().conn())
    }

    pub fn max_applied(&self) -> MetaResult<Option<i64>> {
        max_applied(self.tx().conn())
    }

    /// Insert a ledger row stamped with the current time.
    pub fn record_applied(&self, id: i64, file: &str) -> MetaResult<MigrationRecord> {
        let applied_at = timestamp::now();
        self.tx().exec(
            "INSERT INTO _migrations (id, file, appliedAt) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, file, applied_at],
        )?;
        Ok(MigrationRecord {
            id,
            file: file.to_string(),
            applied_at,
        })
    }

    /// Delete the ledger row of step `id`.
    pub fn remove_applied(&self, id: i64) -> MetaResult<()> {
        let removed = self
            .tx()
            .exec("DELETE FROM _migrations WHERE id = ?1", [id])?;
        if removed == 0 {
            return Err(MetaError::not_found(format!("Ledger row {id}")));
        }
        Ok(())
    }
}
