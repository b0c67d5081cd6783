//! JSON step files.
//!
//! A step file `<id>_<name>.json` holds the operations of both directions:
//!
//! ```json
//! {
//!   "up":   [{"op": "add_field", "target": "jobs", "field": {...}}],
//!   "down": [{"op": "remove_field", "target": "jobs", "field_id": "..."}]
//! }
//! ```

use crate::error::{RunnerError, RunnerResult};
use crate::step::StepFn;
use cm_core::{Collection, Field, RuleKind};
use cm_meta::{Dao, MetaError, MetaResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Decoded step file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationFile {
    #[serde(default)]
    pub up: Vec<Op>,
    #[serde(default)]
    pub down: Vec<Op>,
}

/// One schema operation.
///
/// `target` is a collection name or id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Op {
    CreateCollection {
        collection: Collection,
    },
    DeleteCollection {
        target: String,
    },
    /// Add a field, or replace the field with the same id (renaming the
    /// column if the name differs). `at` moves it to that position.
    AddField {
        target: String,
        field: Field,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<usize>,
    },
    RemoveField {
        target: String,
        field_id: String,
    },
    SetIndexes {
        target: String,
        indexes: Vec<String>,
    },
    SetRule {
        target: String,
        rule: RuleKind,
        value: Option<String>,
    },
    /// Rename the collection; declared indexes follow the table.
    RenameCollection {
        target: String,
        name: String,
    },
    SetViewQuery {
        target: String,
        query: String,
    },
    ImportCollections {
        collections: Vec<Collection>,
        #[serde(default)]
        delete_missing: bool,
    },
    /// Raw SQL batch, for data fixes the schema operations do not cover.
    Sql {
        sql: String,
    },
}

impl Op {
    /// Run the operation through `dao`.
    pub fn apply(&self, dao: &Dao<'_>) -> MetaResult<()> {
        match self {
            Op::CreateCollection { collection } => {
                dao.save_collection(collection)?;
            }
            Op::DeleteCollection { target } => {
                let c = dao.find_collection_by_name_or_id(target)?;
                dao.delete_collection(&c)?;
            }
            Op::AddField { target, field, at } => {
                let mut c = dao.find_collection_by_name_or_id(target)?;
                match at {
                    Some(at) => c.add_field_at(*at, field.clone()),
                    None => c.add_field(field.clone()),
                }
                dao.save_collection(&c)?;
            }
            Op::RemoveField { target, field_id } => {
                let mut c = dao.find_collection_by_name_or_id(target)?;
                if c.remove_field(field_id).is_none() {
                    return Err(MetaError::NotFound {
                        what: format!("Field '{field_id}' in collection '{}'", c.name),
                    });
                }
                dao.save_collection(&c)?;
            }
            Op::SetIndexes { target, indexes } => {
                let mut c = dao.find_collection_by_name_or_id(target)?;
                c.indexes = indexes.clone();
                dao.save_collection(&c)?;
            }
            Op::SetRule {
                target,
                rule,
                value,
            } => {
                let mut c = dao.find_collection_by_name_or_id(target)?;
                c.rules.set(*rule, value.clone());
                dao.save_collection(&c)?;
            }
            Op::RenameCollection { target, name } => {
                let mut c = dao.find_collection_by_name_or_id(target)?;
                c.indexes = cm_sql::retarget_indexes(&c.indexes, name)?;
                c.name = name.clone();
                dao.save_collection(&c)?;
            }
            Op::SetViewQuery { target, query } => {
                let mut c = dao.find_collection_by_name_or_id(target)?;
                c.options.query = Some(query.clone());
                dao.save_collection(&c)?;
            }
            Op::ImportCollections {
                collections,
                delete_missing,
            } => {
                dao.import_collections(collections, *delete_missing)?;
            }
            Op::Sql { sql } => {
                log::debug!("Executing: {sql}");
                dao.tx().execute_batch(sql)?;
            }
        }
        Ok(())
    }
}

impl MigrationFile {
    /// Read and decode a step file.
    pub fn load(path: &Path) -> RunnerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| RunnerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| RunnerError::MigrationFile {
            file: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Turn both directions into step bodies.
    pub fn into_fns(self) -> (StepFn, StepFn) {
        (ops_fn(self.up), ops_fn(self.down))
    }

    /// Pretty JSON for a new, empty step file.
    pub fn scaffold() -> String {
        "{\n  \"up\": [],\n  \"down\": []\n}\n".to_string()
    }
}

fn ops_fn(ops: Vec<Op>) -> StepFn {
    Arc::new(move |dao: &Dao<'_>| ops.iter().try_for_each(|op| op.apply(dao)))
}

#[cfg(test)]
#[path = "file_test.rs"]
mod tests;
