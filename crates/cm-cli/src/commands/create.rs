//! Create command implementation

use anyhow::{Context, Result};
use cm_core::ident::is_valid_identifier;
use cm_core::CoreError;
use cm_runner::MigrationFile;
use std::fs;
use std::path::PathBuf;

use crate::cli::{CreateArgs, GlobalArgs};
use crate::context::load_config;

/// Execute the create command
pub async fn execute(args: &CreateArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let id = chrono::Utc::now().timestamp();
    let path = scaffold(&config.migrations_dir, id, &args.name)?;
    println!("{}", path.display());
    Ok(())
}

/// Write an empty `<id>_<name>.json` step into `dir`, creating it if needed.
pub(crate) fn scaffold(dir: &std::path::Path, id: i64, name: &str) -> Result<PathBuf> {
    if !is_valid_identifier(name) {
        return Err(CoreError::validation(
            "name",
            format!("'{name}' must contain only letters, digits and underscores"),
        )
        .into());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create migrations directory {}", dir.display()))?;
    let path = dir.join(format!("{id}_{name}.json"));
    if path.exists() {
        return Err(CoreError::validation(
            "name",
            format!("{} already exists", path.display()),
        )
        .into());
    }

    fs::write(&path, MigrationFile::scaffold())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Created {}", path.display());
    Ok(path)
}

#[cfg(test)]
#[path = "create_test.rs"]
mod tests;
