//! Meta-store handle.
//!
//! [`MetaDb`] owns the storage [`Adapter`], bootstraps the system tables on
//! open and hands out [`Dao`]s bound to write transactions.

use crate::bootstrap::bootstrap;
use crate::dao::Dao;
use crate::error::MetaResult;
use crate::ledger::{self, MigrationRecord};
use cm_db::{Adapter, DbOptions};
use std::path::Path;

pub struct MetaDb {
    adapter: Adapter,
}

impl MetaDb {
    /// Open (or create) the database at `path` and bootstrap the system tables.
    pub fn open(path: &Path, options: &DbOptions) -> MetaResult<Self> {
        let adapter = Adapter::open(path, options)?;
        bootstrap(&adapter)?;
        Ok(Self { adapter })
    }

    /// In-memory database with the system tables in place.
    pub fn open_memory() -> MetaResult<Self> {
        let adapter = Adapter::open_in_memory()?;
        bootstrap(&adapter)?;
        Ok(Self { adapter })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Run `body` with a [`Dao`] in one `BEGIN IMMEDIATE` transaction,
    /// committing on `Ok` and rolling back on `Err`.
    pub fn transaction<F, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&Dao<'_>) -> Result<T, E>,
        E: From<cm_db::DbError>,
    {
        self.adapter.transaction(|tx| body(&Dao::new(tx)))
    }

    /// Ledger rows as seen by a reader (committed state only).
    pub fn applied_migrations(&self) -> MetaResult<Vec<MigrationRecord>> {
        self.adapter.read(ledger::applied_migrations)
    }

    /// Snapshot of every collection, read in its own transaction.
    pub fn collections(&self) -> MetaResult<Vec<cm_core::Collection>> {
        self.transaction(|dao| dao.find_collections())
    }
}

impl std::fmt::Debug for MetaDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaDb")
            .field("path", &self.adapter.path())
            .finish()
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;

