//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// migrate - versioned collection-schema migrations for SQLite
#[derive(Parser, Debug)]
#[command(name = "migrate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// SQLite database file
    #[arg(long, global = true, env = "DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Directory holding `<id>_<name>.json` migration files [default: ./migrations]
    #[arg(long, global = true, env = "MIGRATIONS_DIR")]
    pub migrations_dir: Option<PathBuf>,

    /// How long to wait for the migration lock (500ms, 10s, 2m, 1h) [default: 10s]
    #[arg(long, global = true, env = "MIGRATIONS_LOCK_TIMEOUT", value_parser = parse_lock_timeout)]
    pub lock_timeout: Option<Duration>,

    /// YAML config file, overridden by environment and flags
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

fn parse_lock_timeout(s: &str) -> Result<Duration, String> {
    cm_core::config::parse_duration(s).map_err(|e| e.to_string())
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending migrations
    Up(UpArgs),

    /// Revert applied migrations (the latest one by default)
    Down(DownArgs),

    /// Show every migration and whether it is applied
    Status(StatusArgs),

    /// Scaffold an empty migration file
    Create(CreateArgs),

    /// Forget applied migrations whose file no longer exists
    HistorySync,
}

/// Arguments for the up command
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Stop after this migration id
    #[arg(long)]
    pub to: Option<i64>,
}

/// Arguments for the down command
#[derive(Args, Debug)]
pub struct DownArgs {
    /// Revert every migration above this id (0 reverts all)
    #[arg(long)]
    pub to: Option<i64>,
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the create command
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Migration name, e.g. `updated_purchase_orders`
    pub name: String,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
