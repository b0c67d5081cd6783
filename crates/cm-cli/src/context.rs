//! Runtime context for CLI commands

use anyhow::Result;
use cm_core::Config;
use cm_db::DbOptions;
use cm_meta::MetaDb;
use cm_runner::{CancelToken, FrozenRegistry, Registry, Runner};

use crate::cli::GlobalArgs;

/// Loaded configuration, open database and frozen step registry
pub(crate) struct RuntimeContext {
    pub config: Config,
    pub db: MetaDb,
    pub registry: FrozenRegistry,
}

impl RuntimeContext {
    /// Open the database and register every step file.
    pub fn open(global: &GlobalArgs) -> Result<Self> {
        let config = load_config(global)?;
        let db_path = config.require_db_path()?;
        let db = MetaDb::open(db_path, &DbOptions::from(&config))?;

        let mut registry = Registry::new();
        let count = registry.load_dir(&config.migrations_dir)?;
        log::debug!(
            "Loaded {count} migration file(s) from {}",
            config.migrations_dir.display()
        );
        let registry = registry.freeze()?;

        Ok(Self {
            config,
            db,
            registry,
        })
    }

    pub fn runner(&self, cancel: CancelToken) -> Runner<'_> {
        Runner::new(&self.db, &self.registry)
            .with_lock_timeout(self.config.lock_timeout)
            .with_stale_after(self.config.stale_lock_after)
            .with_cancel_token(cancel)
    }

    /// Print the highest applied id on stdout, or `none`.
    pub fn print_last_applied(&self) {
        match self.db.applied_migrations() {
            Ok(applied) => match applied.last() {
                Some(record) => println!("{}", record.id),
                None => println!("none"),
            },
            Err(e) => log::warn!("Could not read the migration ledger: {e}"),
        }
    }
}

/// Config file, then environment, then flags.
pub(crate) fn load_config(global: &GlobalArgs) -> Result<Config> {
    let mut config = match &global.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    }
    .apply_env()?;

    if let Some(path) = &global.db_path {
        config.db_path = Some(path.clone());
    }
    if let Some(dir) = &global.migrations_dir {
        config.migrations_dir = dir.clone();
    }
    if let Some(timeout) = global.lock_timeout {
        config.lock_timeout = timeout;
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
#[path = "context_test.rs"]
mod tests;
