//! Runtime configuration for the migration engine.
//!
//! Values come from three layers, later ones winning: an optional YAML file,
//! the environment (`DB_PATH`, `MIGRATIONS_DIR`, `MIGRATIONS_LOCK_TIMEOUT`),
//! and command-line flags applied by the CLI.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the database file.
pub const ENV_DB_PATH: &str = "DB_PATH";
/// Environment variable naming the migrations directory.
pub const ENV_MIGRATIONS_DIR: &str = "MIGRATIONS_DIR";
/// Environment variable with the lock timeout (`500ms`, `10s`, `2m`, ...).
pub const ENV_LOCK_TIMEOUT: &str = "MIGRATIONS_LOCK_TIMEOUT";

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// SQLite database file. Required before the runner can start.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Directory scanned for `<id>_<name>.json` migration files
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,

    /// How long to wait for the writer lock and the advisory lock row
    #[serde(default = "default_lock_timeout", with = "duration_str")]
    pub lock_timeout: Duration,

    /// SQLite `busy_timeout` for every pooled connection
    #[serde(default = "default_busy_timeout", with = "duration_str")]
    pub busy_timeout: Duration,

    /// Read-only connections opened next to the writer
    #[serde(default = "default_readers")]
    pub readers: usize,

    /// Advisory lock rows older than this are considered abandoned
    #[serde(default = "default_stale_lock_after", with = "duration_str")]
    pub stale_lock_after: Duration,
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("./migrations")
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_readers() -> usize {
    2
}

fn default_stale_lock_after() -> Duration {
    Duration::from_secs(600)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            migrations_dir: default_migrations_dir(),
            lock_timeout: default_lock_timeout(),
            busy_timeout: default_busy_timeout(),
            readers: default_readers(),
            stale_lock_after: default_stale_lock_after(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParseError {
                message: e.to_string(),
            })?;
        config.validate()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Overlay values from the process environment.
    pub fn apply_env(self) -> CoreResult<Self> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary lookup (the environment in production).
    pub fn apply_env_from<F>(mut self, lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty(ENV_DB_PATH) {
            self.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty(ENV_MIGRATIONS_DIR) {
            self.migrations_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty(ENV_LOCK_TIMEOUT) {
            self.lock_timeout = parse_duration(&v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// The database path, or an error if none was configured.
    pub fn require_db_path(&self) -> CoreResult<&Path> {
        self.db_path.as_deref().ok_or_else(|| CoreError::ConfigInvalid {
            message: format!("{ENV_DB_PATH} is not set"),
        })
    }

    /// Check values that no layer may set. Run again after overlaying flags.
    pub fn validate(&self) -> CoreResult<()> {
        if self.lock_timeout.is_zero() {
            return Err(CoreError::ConfigInvalid {
                message: "lock_timeout must be greater than zero".to_string(),
            });
        }
        if self.stale_lock_after.is_zero() {
            return Err(CoreError::ConfigInvalid {
                message: "stale_lock_after must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse a duration such as `500ms`, `10s`, `2m` or `1h`.
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> CoreResult<Duration> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let invalid = || CoreError::ConfigInvalid {
        message: format!("invalid duration '{s}' (expected e.g. 500ms, 10s, 2m, 1h)"),
    };
    let n: u64 = digits.parse().map_err(|_| invalid())?;
    let secs = |per: u64| {
        n.checked_mul(per)
            .map(Duration::from_secs)
            .ok_or_else(|| CoreError::ConfigInvalid {
                message: format!("duration '{s}' is too large"),
            })
    };
    match unit.trim() {
        "ms" => Ok(Duration::from_millis(n)),
        "" | "s" => secs(1),
        "m" => secs(60),
        "h" => secs(3600),
        _ => Err(invalid()),
    }
}

/// Render a duration in the largest exact unit.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 != 0 {
        format!("{ms}ms")
    } else {
        let secs = d.as_secs();
        if secs != 0 && secs % 3600 == 0 {
            format!("{}h", secs / 3600)
        } else if secs != 0 && secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{secs}s")
        }
    }
}

mod duration_str {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
