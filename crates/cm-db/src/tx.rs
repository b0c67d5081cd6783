//! Write transactions on the pooled writer connection.

use crate::error::DbResult;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Params, Row};
use std::sync::MutexGuard;

/// An open `BEGIN IMMEDIATE` transaction holding the writer connection.
///
/// Dropping a `Tx` without calling [`Tx::commit`] rolls it back.
pub struct Tx<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl<'a> Tx<'a> {
    /// Wrap a writer connection on which `BEGIN` already succeeded.
    pub(crate) fn started(conn: MutexGuard<'a, Connection>) -> Self {
        Self {
            conn,
            finished: false,
        }
    }

    /// Borrow the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute one statement, returning the number of rows changed.
    pub fn exec<P: Params>(&self, sql: &str, params: P) -> DbResult<usize> {
        Ok(self.conn.execute(sql, params)?)
    }

    /// Execute a semicolon-separated batch without parameters.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        Ok(self.conn.execute_batch(sql)?)
    }

    /// Run a query and return every row as raw SQLite values.
    pub fn query<P: Params>(&self, sql: &str, params: P) -> DbResult<Vec<Vec<Value>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let width = stmt.column_count();
        let rows = stmt
            .query_map(params, |row| {
                (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Run a query and map every row.
    pub fn query_map<T, P, F>(&self, sql: &str, params: P, f: F) -> DbResult<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, f)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Run a query expected to return at most one row.
    pub fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> DbResult<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        Ok(self.conn.query_row(sql, params, f).optional()?)
    }

    pub fn commit(mut self) -> DbResult<()> {
        self.finished = true;
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(e.into());
        }
        Ok(())
    }

    pub fn rollback(mut self) -> DbResult<()> {
        self.finished = true;
        Ok(self.conn.execute_batch("ROLLBACK")?)
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!("Rolling back unfinished transaction");
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                log::warn!("Rollback failed: {e}");
            }
        }
    }
}
