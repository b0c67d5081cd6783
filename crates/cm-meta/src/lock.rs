//! Advisory migration lock in `_migration_lock`.
//!
//! At most one row (`key = 1`) exists. A batch inserts it at start and
//! deletes it at the end; a row left behind by a crashed process is swept
//! once it is older than the stale threshold.

use crate::dao::Dao;
use crate::error::MetaResult;
use crate::timestamp;
use serde::Serialize;
use std::time::Duration;

/// Current owner of the advisory lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockHolder {
    pub owner: String,
    pub since: String,
}

impl Dao<'_> {
    /// Take the lock for `owner`. Returns `false` when someone else holds it.
    ///
    /// Re-acquiring a lock already held by `owner` succeeds.
    pub fn acquire_lock(&self, owner: &str) -> MetaResult<bool> {
        let inserted = self.tx().exec(
            "INSERT OR IGNORE INTO _migration_lock (key, owner, since) VALUES (1, ?1, ?2)",
            rusqlite::params![owner, timestamp::now()],
        )?;
        if inserted == 1 {
            return Ok(true);
        }
        Ok(self.lock_holder()?.is_some_and(|h| h.owner == owner))
    }

    /// Release the lock if `owner` holds it. Returns whether a row was removed.
    pub fn release_lock(&self, owner: &str) -> MetaResult<bool> {
        let removed = self.tx().exec(
            "DELETE FROM _migration_lock WHERE key = 1 AND owner = ?1",
            [owner],
        )?;
        Ok(removed == 1)
    }

    /// Remove a lock row older than `older_than`.
    pub fn clear_stale_locks(&self, older_than: Duration) -> MetaResult<usize> {
        let cutoff = timestamp::before_now(older_than);
        let holder = self.lock_holder()?;
        let removed = self
            .tx()
            .exec("DELETE FROM _migration_lock WHERE since < ?1", [&cutoff])?;
        if let (Some(holder), true) = (holder, removed > 0) {
            log::warn!(
                "Cleared stale migration lock held by {} since {}",
                holder.owner,
                holder.since
            );
        }
        Ok(removed)
    }

    pub fn lock_holder(&self) -> MetaResult<Option<LockHolder>> {
        Ok(self.tx().query_row(
            "SELECT owner, since FROM _migration_lock WHERE key = 1",
            [],
            |row| {
                Ok(LockHolder {
                    owner: row.get(0)?,
                    since: row.get(1)?,
                })
            },
        )?)
    }
}
