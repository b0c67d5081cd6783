//! Pooled SQLite access: one writer plus read-only readers.
//!
//! The writer sits behind a mutex and is the only connection that ever
//! writes. File databases additionally get `readers` read-only connections
//! which, under WAL, observe only committed states. In-memory databases
//! cannot be shared between connections, so reads go to the writer.

use crate::error::{DbError, DbResult};
use crate::schema;
use crate::tx::Tx;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Connection settings.
#[derive(Debug, Clone)]
pub struct DbOptions {
    /// SQLite `busy_timeout` for every connection
    pub busy_timeout: Duration,
    /// Upper bound for acquiring the writer in [`Adapter::begin`]
    pub lock_timeout: Duration,
    /// Read-only connections for file databases
    pub readers: usize,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(10),
            lock_timeout: Duration::from_secs(10),
            readers: 2,
        }
    }
}

impl From<&cm_core::Config> for DbOptions {
    fn from(config: &cm_core::Config) -> Self {
        Self {
            busy_timeout: config.busy_timeout,
            lock_timeout: config.lock_timeout,
            readers: config.readers,
        }
    }
}

const BACKOFF_START: Duration = Duration::from_millis(10);
const BACKOFF_MAX: Duration = Duration::from_millis(500);

/// Storage adapter over a single SQLite database.
pub struct Adapter {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
    lock_timeout: Duration,
    path: Option<PathBuf>,
}

impl Adapter {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path, options: &DbOptions) -> DbResult<Self> {
        let started = Instant::now();
        let writer = Connection::open(path)
            .map_err(|e| DbError::Connection(format!("{e}: {}", path.display())))?;
        configure(&writer, options.busy_timeout)?;
        let mode: String =
            writer.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        let mut readers = Vec::with_capacity(options.readers);
        for _ in 0..options.readers {
            let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI;
            let reader = Connection::open_with_flags(path, flags)
                .map_err(|e| DbError::Connection(format!("{e}: {}", path.display())))?;
            reader.busy_timeout(options.busy_timeout)?;
            readers.push(Mutex::new(reader));
        }

        log::debug!(
            "Opened {} (journal_mode={mode}, readers={}) in {}ms",
            path.display(),
            readers.len(),
            started.elapsed().as_millis()
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
            lock_timeout: options.lock_timeout,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database. Reads are served by the writer.
    pub fn open_in_memory() -> DbResult<Self> {
        let writer =
            Connection::open_in_memory().map_err(|e| DbError::Connection(e.to_string()))?;
        let options = DbOptions::default();
        configure(&writer, options.busy_timeout)?;
        Ok(Self {
            writer: Mutex::new(writer),
            readers: Vec::new(),
            next_reader: AtomicUsize::new(0),
            lock_timeout: options.lock_timeout,
            path: None,
        })
    }

    /// Database file, or `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Lock the writer, recovering it after a panic in a previous holder.
    ///
    /// A panicking [`Tx`] rolls back while unwinding, so the connection is
    /// reusable; any transaction still open is rolled back here.
    fn writer(&self) -> DbResult<MutexGuard<'_, Connection>> {
        let conn = self.writer.lock().unwrap_or_else(|poisoned| {
            log::warn!("Recovering writer connection after a panic");
            self.writer.clear_poison();
            poisoned.into_inner()
        });
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(conn)
    }

    /// Start a `BEGIN IMMEDIATE` transaction on the writer.
    ///
    /// Busy or locked databases are retried with exponential backoff until
    /// the lock timeout elapses, then [`DbError::Locked`] is returned.
    pub fn begin(&self) -> DbResult<Tx<'_>> {
        let conn = self.writer()?;
        let deadline = deadline_after(self.lock_timeout);
        let mut delay = BACKOFF_START;
        let mut attempt = 1u32;

        loop {
            match conn.execute_batch("BEGIN IMMEDIATE") {
                Ok(()) => return Ok(Tx::started(conn)),
                Err(e) => {
                    let err = DbError::from(e);
                    if !err.is_busy() || Instant::now() + delay > deadline {
                        return Err(match err {
                            DbError::Locked(msg) => DbError::Locked(format!(
                                "writer lock not acquired after {attempt} attempt(s): {msg}"
                            )),
                            other => other,
                        });
                    }
                    log::debug!("BEGIN IMMEDIATE busy, retrying in {}ms", delay.as_millis());
                    thread::sleep(delay);
                    delay = (delay * 2).min(BACKOFF_MAX);
                    attempt += 1;
                }
            }
        }
    }

    /// Run `body` in a write transaction: commit on `Ok`, roll back on `Err`.
    pub fn transaction<F, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&Tx<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        let tx = self.begin()?;
        match body(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    log::warn!("Rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    /// Run `body` against a read connection.
    ///
    /// For in-memory databases this is the writer: do not call it while a
    /// [`Tx`] from the same adapter is alive on the current thread.
    pub fn read<F, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<DbError>,
    {
        if self.readers.is_empty() {
            let conn = self.writer()?;
            return body(&conn);
        }
        let i = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[i].lock().unwrap_or_else(|poisoned| {
            self.readers[i].clear_poison();
            poisoned.into_inner()
        });
        body(&conn)
    }

    /// Problems reported by `PRAGMA integrity_check` (empty when healthy).
    pub fn integrity_check(&self) -> DbResult<Vec<String>> {
        self.read(schema::integrity_check)
    }

    pub fn table_exists(&self, name: &str) -> DbResult<bool> {
        self.read(|conn| schema::table_exists(conn, name))
    }

    pub fn table_sql(&self, name: &str) -> DbResult<Option<String>> {
        self.read(|conn| schema::table_sql(conn, name))
    }
}

/// `now + timeout`, capped at a day for timeouts too large for [`Instant`].
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(Duration::from_secs(86_400)))
        .unwrap_or(now)
}

fn configure(conn: &Connection, busy_timeout: Duration) -> DbResult<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

#[cfg(test)]
#[path = "adapter_test.rs"]
mod tests;
