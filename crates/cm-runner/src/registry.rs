//! Step registration.
//!
//! Steps are collected into a [`Registry`] at startup, either in code or by
//! scanning a directory of JSON step files, then frozen into an immutable,
//! id-ordered [`FrozenRegistry`] before the runner starts.

use crate::error::{RunnerError, RunnerResult};
use crate::file::MigrationFile;
use crate::step::{base_name, parse_id, Migration};
use cm_meta::{Dao, MetaResult};
use std::path::Path;
use std::sync::Arc;

/// Register a step from the current source file: the id comes from its
/// `<id>_<name>.rs` file name.
#[macro_export]
macro_rules! register_migration {
    ($registry:expr, $up:expr, $down:expr) => {
        $registry.register(file!(), $up, $down)
    };
}

/// Mutable collection of steps, in registration order.
#[derive(Debug, Default)]
pub struct Registry {
    steps: Vec<Migration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step whose id is the numeric prefix of `file`.
    pub fn register<U, D>(&mut self, file: &str, up: U, down: D) -> RunnerResult<()>
    where
        U: Fn(&Dao<'_>) -> MetaResult<()> + Send + Sync + 'static,
        D: Fn(&Dao<'_>) -> MetaResult<()> + Send + Sync + 'static,
    {
        let id = parse_id(file)?;
        self.register_with_id(id, file, up, down);
        Ok(())
    }

    /// Register a step with an explicit id.
    pub fn register_with_id<U, D>(&mut self, id: i64, file: &str, up: U, down: D)
    where
        U: Fn(&Dao<'_>) -> MetaResult<()> + Send + Sync + 'static,
        D: Fn(&Dao<'_>) -> MetaResult<()> + Send + Sync + 'static,
    {
        self.push(Migration {
            id,
            file: base_name(file),
            up: Arc::new(up),
            down: Arc::new(down),
        });
    }

    fn push(&mut self, step: Migration) {
        log::debug!("Registered migration {} ({})", step.id, step.file);
        self.steps.push(step);
    }

    /// Register every `*.json` step file in `dir`.
    ///
    /// A missing directory registers nothing.
    pub fn load_dir(&mut self, dir: &Path) -> RunnerResult<usize> {
        if !dir.exists() {
            log::debug!("Migrations directory {} does not exist", dir.display());
            return Ok(0);
        }
        let io_err = |source| RunnerError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && path.extension().is_some_and(|e| e == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            let file = path.to_string_lossy();
            let id = parse_id(&file)?;
            let (up, down) = MigrationFile::load(path)?.into_fns();
            self.push(Migration {
                id,
                file: base_name(&file),
                up,
                down,
            });
        }
        Ok(paths.len())
    }

    /// Sort by id and reject duplicates.
    pub fn freeze(mut self) -> RunnerResult<FrozenRegistry> {
        self.steps.sort_by_key(|s| s.id);
        if let Some(pair) = self.steps.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(RunnerError::DuplicateMigrationId {
                id: pair[0].id,
                first: pair[0].file.clone(),
                second: pair[1].file.clone(),
            });
        }
        Ok(FrozenRegistry { steps: self.steps })
    }
}

/// Immutable, id-ordered set of steps.
#[derive(Debug)]
pub struct FrozenRegistry {
    steps: Vec<Migration>,
}

impl FrozenRegistry {
    pub fn steps(&self) -> &[Migration] {
        &self.steps
    }

    pub fn get(&self, id: i64) -> Option<&Migration> {
        self.steps
            .binary_search_by_key(&id, |s| s.id)
            .ok()
            .map(|i| &self.steps[i])
    }

    pub fn contains(&self, id: i64) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
