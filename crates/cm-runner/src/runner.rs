//! Applies and reverts registered steps against the ledger.
//!
//! Each step runs in its own `BEGIN IMMEDIATE` transaction together with its
//! ledger write, so readers see either the state before or after a step.
//! A batch holds the advisory lock in `_migration_lock` from start to end
//! and stops at the first failing step; committed steps stay applied. The
//! lock is released on panic too, and a lock left by an exited process on
//! this host is cleared without waiting for it to go stale.

use crate::cancel::CancelToken;
use crate::error::{RunnerError, RunnerResult};
use crate::registry::FrozenRegistry;
use crate::step::Migration;
use cm_meta::{LockHolder, MetaDb, MetaError, MigrationRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::thread;
use std::time::{Duration, Instant};

const LOCK_BACKOFF_START: Duration = Duration::from_millis(50);
const LOCK_BACKOFF_MAX: Duration = Duration::from_secs(1);
/// Wait used when the lock timeout does not fit in an [`Instant`].
const LOCK_WAIT_CAP: Duration = Duration::from_secs(86_400);

/// State of a step relative to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Applied,
    /// In the ledger but not registered
    Divergent,
}

/// One row of `migrate status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepStatus {
    pub id: i64,
    pub file: String,
    pub state: StepState,
    #[serde(rename = "appliedAt", skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<String>,
}

/// Outcome of an apply or revert batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Step ids processed, in execution order
    pub steps: Vec<i64>,
    /// Highest applied id once the batch ended
    pub last_applied: Option<i64>,
    /// The batch stopped early because of a cancellation request
    pub cancelled: bool,
}

/// Drives a [`FrozenRegistry`] against one database.
pub struct Runner<'a> {
    db: &'a MetaDb,
    registry: &'a FrozenRegistry,
    owner: String,
    lock_timeout: Duration,
    stale_after: Duration,
    cancel: CancelToken,
}

impl<'a> Runner<'a> {
    pub fn new(db: &'a MetaDb, registry: &'a FrozenRegistry) -> Self {
        Self {
            db,
            registry,
            owner: format!("pid{}-{}", std::process::id(), uuid::Uuid::new_v4()),
            lock_timeout: Duration::from_secs(10),
            stale_after: Duration::from_secs(600),
            cancel: CancelToken::new(),
        }
    }

    /// How long to wait for another runner's advisory lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Age after which an advisory lock row counts as abandoned.
    pub fn with_stale_after(mut self, age: Duration) -> Self {
        self.stale_after = age;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Apply pending steps in ascending id order, up to `target` inclusive.
    pub fn apply(&self, target: Option<i64>) -> RunnerResult<RunReport> {
        self.locked(|| {
            let applied = self.db.applied_migrations()?;
            self.check_divergence(&applied)?;

            let done: HashSet<i64> = applied.iter().map(|r| r.id).collect();
            let max_applied = applied.last().map(|r| r.id);
            let pending: Vec<&Migration> = self
                .registry
                .steps()
                .iter()
                .filter(|s| !done.contains(&s.id))
                .filter(|s| target.map_or(true, |t| s.id <= t))
                .collect();

            if let (Some(first), Some(max_applied)) = (pending.first(), max_applied) {
                if first.id < max_applied {
                    return Err(RunnerError::OutOfOrder {
                        id: first.id,
                        max_applied,
                    });
                }
            }

            let mut report = RunReport {
                last_applied: max_applied,
                ..RunReport::default()
            };
            for step in pending {
                if self.cancel.is_cancelled() {
                    log::info!("Cancelled before migration {}", step.id);
                    report.cancelled = true;
                    break;
                }
                self.apply_step(step)?;
                report.steps.push(step.id);
                report.last_applied = Some(step.id);
            }

            log::info!("Applied {} migration(s)", report.steps.len());
            Ok(report)
        })
    }

    fn apply_step(&self, step: &Migration) -> RunnerResult<()> {
        let started = Instant::now();
        self.db.transaction(|dao| {
            (step.up)(dao).map_err(|source| RunnerError::StepFailed {
                id: step.id,
                file: step.file.clone(),
                source,
            })?;
            dao.record_applied(step.id, &step.file)?;
            Ok::<_, RunnerError>(())
        })?;
        log::info!(
            "Applied {} ({}) in {}ms",
            step.id,
            step.file,
            started.elapsed().as_millis()
        );
        Ok(())
    }

    /// Revert applied steps in descending id order.
    ///
    /// Without a target only the most recent step is reverted; with one,
    /// every applied step above it is (`Some(0)` reverts everything).
    pub fn revert(&self, target: Option<i64>) -> RunnerResult<RunReport> {
        self.locked(|| {
            let applied = self.db.applied_migrations()?;
            self.check_divergence(&applied)?;

            let mut ids: Vec<i64> = applied.iter().rev().map(|r| r.id).collect();
            match target {
                Some(t) => ids.retain(|&id| id > t),
                None => ids.truncate(1),
            }

            let mut report = RunReport {
                last_applied: applied.last().map(|r| r.id),
                ..RunReport::default()
            };
            for id in ids {
                if self.cancel.is_cancelled() {
                    log::info!("Cancelled before reverting migration {id}");
                    report.cancelled = true;
                    break;
                }
                let Some(step) = self.registry.get(id) else {
                    return Err(RunnerError::LedgerDivergence { id });
                };
                self.revert_step(step)?;
                report.steps.push(id);
                report.last_applied = applied.iter().rev().map(|r| r.id).find(|&a| a < id);
            }

            log::info!("Reverted {} migration(s)", report.steps.len());
            Ok(report)
        })
    }

    fn revert_step(&self, step: &Migration) -> RunnerResult<()> {
        self.db.transaction(|dao| {
            (step.down)(dao).map_err(|source| RunnerError::StepFailed {
                id: step.id,
                file: step.file.clone(),
                source,
            })?;
            dao.remove_applied(step.id)?;
            Ok::<_, RunnerError>(())
        })?;
        log::info!("Reverted {} ({})", step.id, step.file);
        Ok(())
    }

    /// Every registered step with its state, plus unregistered ledger rows.
    pub fn status(&self) -> RunnerResult<Vec<StepStatus>> {
        let applied: BTreeMap<i64, MigrationRecord> = self
            .db
            .applied_migrations()?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();

        let mut rows: Vec<StepStatus> = self
            .registry
            .steps()
            .iter()
            .map(|s| {
                let record = applied.get(&s.id);
                StepStatus {
                    id: s.id,
                    file: s.file.clone(),
                    state: if record.is_some() {
                        StepState::Applied
                    } else {
                        StepState::Pending
                    },
                    applied_at: record.map(|r| r.applied_at.clone()),
                }
            })
            .collect();

        rows.extend(
            applied
                .values()
                .filter(|r| !self.registry.contains(r.id))
                .map(|r| StepStatus {
                    id: r.id,
                    file: r.file.clone(),
                    state: StepState::Divergent,
                    applied_at: Some(r.applied_at.clone()),
                }),
        );
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    /// Delete ledger rows whose step is no longer registered.
    ///
    /// The schema changes of those steps are left in place.
    pub fn history_sync(&self) -> RunnerResult<Vec<i64>> {
        self.locked(|| {
            let orphans: Vec<i64> = self
                .db
                .applied_migrations()?
                .into_iter()
                .map(|r| r.id)
                .filter(|id| !self.registry.contains(*id))
                .collect();
            self.db.transaction(|dao| {
                for id in &orphans {
                    dao.remove_applied(*id)?;
                    log::info!("Removed ledger row {id}");
                }
                Ok::<_, RunnerError>(())
            })?;
            Ok(orphans)
        })
    }

    fn check_divergence(&self, applied: &[MigrationRecord]) -> RunnerResult<()> {
        match applied.iter().find(|r| !self.registry.contains(r.id)) {
            Some(r) => Err(RunnerError::LedgerDivergence { id: r.id }),
            None => Ok(()),
        }
    }

    /// Run `body` while holding the advisory lock.
    ///
    /// The lock is released when `body` returns or unwinds.
    fn locked<T>(&self, body: impl FnOnce() -> RunnerResult<T>) -> RunnerResult<T> {
        let _guard = self.acquire()?;
        body()
    }

    fn acquire(&self) -> RunnerResult<LockGuard<'_>> {
        let now = Instant::now();
        let deadline = now
            .checked_add(self.lock_timeout)
            .or_else(|| now.checked_add(LOCK_WAIT_CAP))
            .unwrap_or(now);
        let mut delay = LOCK_BACKOFF_START;
        loop {
            let (acquired, holder) =
                self.db
                    .transaction(|dao| -> Result<(bool, Option<LockHolder>), MetaError> {
                        dao.clear_stale_locks(self.stale_after)?;
                        if let Some(holder) = dao.lock_holder()? {
                            if owner_is_dead(&holder.owner) && dao.release_lock(&holder.owner)? {
                                log::warn!(
                                    "Cleared migration lock of exited process {} (since {})",
                                    holder.owner,
                                    holder.since
                                );
                            }
                        }
                        if dao.acquire_lock(&self.owner)? {
                            return Ok((true, None));
                        }
                        Ok((false, dao.lock_holder()?))
                    })?;
            if acquired {
                log::debug!("Acquired migration lock as {}", self.owner);
                return Ok(LockGuard { runner: self });
            }
            let holder = holder.unwrap_or_else(|| LockHolder {
                owner: "<released>".to_string(),
                since: String::new(),
            });
            if Instant::now().checked_add(delay).map_or(true, |t| t > deadline) {
                return Err(RunnerError::Locked {
                    holder: holder.owner,
                    since: holder.since,
                });
            }
            log::debug!("Migration lock held by {}, retrying", holder.owner);
            thread::sleep(delay);
            delay = (delay * 2).min(LOCK_BACKOFF_MAX);
        }
    }
}

/// Releases the advisory lock on drop, including while unwinding.
struct LockGuard<'r> {
    runner: &'r Runner<'r>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let owner = &self.runner.owner;
        match self.runner.db.transaction(|dao| dao.release_lock(owner)) {
            Ok(true) => log::debug!("Released migration lock as {owner}"),
            Ok(false) => log::warn!("Migration lock of {owner} was already gone"),
            Err(e) => log::warn!("Failed to release migration lock: {e}"),
        }
    }
}

/// Whether the lock owner names a process on this host that has exited.
///
/// Owners are `pid<N>-<uuid>`. Liveness is only checked through `/proc`;
/// elsewhere a holder counts as alive until the stale threshold.
fn owner_is_dead(owner: &str) -> bool {
    let pid = owner
        .strip_prefix("pid")
        .and_then(|rest| rest.split('-').next())
        .and_then(|pid| pid.parse::<u32>().ok());
    match pid {
        Some(pid) if pid != std::process::id() => !process_alive(pid),
        _ => false,
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    std::path::Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
