//! Migration steps.

use crate::error::{RunnerError, RunnerResult};
use cm_meta::{Dao, MetaResult};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Body of an `up` or `down` direction. Runs inside the step's transaction.
pub type StepFn = Arc<dyn Fn(&Dao<'_>) -> MetaResult<()> + Send + Sync>;

/// One registered migration step.
#[derive(Clone)]
pub struct Migration {
    pub id: i64,
    /// File name the step was registered from (without directories)
    pub file: String,
    pub up: StepFn,
    pub down: StepFn,
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id)
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

/// Final path component of `file`.
pub(crate) fn base_name(file: &str) -> String {
    Path::new(file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string())
}

/// The id encoded in a `<digits>_<name>.<ext>` file name.
pub fn parse_id(file: &str) -> RunnerResult<i64> {
    let name = base_name(file);
    let invalid = || RunnerError::InvalidFileName { file: name.clone() };

    let digits: &str = name
        .split_once('_')
        .map(|(prefix, _)| prefix)
        .ok_or_else(invalid)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match digits.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(invalid()),
    }
}
