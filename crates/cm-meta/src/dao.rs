//! Collection access bound to an open transaction.
//!
//! Every write goes through [`Dao::save_collection`] or
//! [`Dao::delete_collection`], which validate the snapshot, plan the DDL
//! against the persisted version and run both the DDL and the `_collections`
//! upsert in the caller's transaction.

use crate::error::{MetaError, MetaResult};
use crate::timestamp;
use cm_core::ident::looks_like_collection_id;
use cm_core::{Collection, CollectionId};
use cm_db::{schema, Tx};
use cm_sql::{
    effective_indexes, plan, quote_ident, rename_relation, view_dependencies, DdlOp, DdlStatement,
};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use rusqlite::Row;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

const SELECT_COLLECTION: &str = "SELECT id, name, type, system, schema, indexes, rules, options, created, updated \
     FROM _collections";

/// Data access object over the system tables.
pub struct Dao<'a> {
    tx: &'a Tx<'a>,
}

/// Raw `_collections` row before JSON decoding.
struct CollectionRow {
    id: String,
    name: String,
    kind: String,
    system: bool,
    schema: String,
    indexes: String,
    rules: String,
    options: String,
    created: String,
    updated: String,
}

impl CollectionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            system: row.get(3)?,
            schema: row.get(4)?,
            indexes: row.get(5)?,
            rules: row.get(6)?,
            options: row.get(7)?,
            created: row.get(8)?,
            updated: row.get(9)?,
        })
    }

    fn decode(self) -> MetaResult<Collection> {
        let id = self.id;
        let json = |field: &str, raw: &str| -> MetaResult<serde_json::Value> {
            serde_json::from_str(raw).map_err(|e| MetaError::Snapshot {
                id: id.clone(),
                message: format!("{field}: {e}"),
            })
        };

        let mut object = serde_json::Map::new();
        object.insert("id".into(), id.clone().into());
        object.insert("name".into(), self.name.into());
        object.insert("type".into(), self.kind.into());
        object.insert("system".into(), self.system.into());
        object.insert("schema".into(), json("schema", &self.schema)?);
        object.insert("indexes".into(), json("indexes", &self.indexes)?);
        object.insert("options".into(), json("options", &self.options)?);
        if let serde_json::Value::Object(rules) = json("rules", &self.rules)? {
            object.extend(rules);
        }
        if !self.created.is_empty() {
            object.insert("created".into(), self.created.into());
        }
        if !self.updated.is_empty() {
            object.insert("updated".into(), self.updated.into());
        }

        Collection::from_value(serde_json::Value::Object(object)).map_err(|e| {
            MetaError::Snapshot {
                id,
                message: e.to_string(),
            }
        })
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> MetaResult<String> {
    serde_json::to_string(value).map_err(|e| MetaError::validation("snapshot", e.to_string()))
}

/// SHA-256 of every persisted part of a snapshot except its timestamps.
fn snapshot_checksum(c: &Collection) -> MetaResult<String> {
    let json = to_json(&(
        &c.name,
        c.kind.to_string(),
        c.system,
        &c.fields,
        &c.indexes,
        &c.rules,
        &c.options,
    ))?;
    Ok(format!("{:x}", Sha256::digest(json.as_bytes())))
}

impl<'a> Dao<'a> {
    pub fn new(tx: &'a Tx<'a>) -> Self {
        Self { tx }
    }

    /// The transaction this DAO writes through.
    pub fn tx(&self) -> &Tx<'a> {
        self.tx
    }

    fn query_collections(
        &self,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> MetaResult<Vec<Collection>> {
        let sql = format!("{SELECT_COLLECTION} {filter}");
        let rows = self.tx.query_map(&sql, params, CollectionRow::from_row)?;
        rows.into_iter().map(CollectionRow::decode).collect()
    }

    /// Collection with exactly this id, if any.
    pub fn find_collection_by_id(&self, id: &str) -> MetaResult<Option<Collection>> {
        Ok(self
            .query_collections("WHERE id = ?1", [id])?
            .into_iter()
            .next())
    }

    /// Collection with this name (case-insensitive), if any.
    pub fn find_collection_by_name(&self, name: &str) -> MetaResult<Option<Collection>> {
        Ok(self
            .query_collections("WHERE name = ?1 COLLATE NOCASE", [name])?
            .into_iter()
            .next())
    }

    /// Resolve `name_or_id`, preferring an id lookup when it has the shape of
    /// a generated id.
    pub fn find_collection_by_name_or_id(&self, name_or_id: &str) -> MetaResult<Collection> {
        let found = if looks_like_collection_id(name_or_id) {
            match self.find_collection_by_id(name_or_id)? {
                Some(c) => Some(c),
                None => self.find_collection_by_name(name_or_id)?,
            }
        } else {
            match self.find_collection_by_name(name_or_id)? {
                Some(c) => Some(c),
                None => self.find_collection_by_id(name_or_id)?,
            }
        };
        found.ok_or_else(|| MetaError::not_found(format!("Collection '{name_or_id}'")))
    }

    /// All collections ordered by name.
    pub fn find_collections(&self) -> MetaResult<Vec<Collection>> {
        self.query_collections("ORDER BY name COLLATE NOCASE", [])
    }

    /// Collections other than `target` with a relation field pointing at it.
    pub fn find_dependents(&self, target: &CollectionId) -> MetaResult<Vec<Collection>> {
        Ok(self
            .find_collections()?
            .into_iter()
            .filter(|c| &c.id != target && c.references(target))
            .collect())
    }

    /// Create or update `collection`, returning the DDL that was executed.
    pub fn save_collection(&self, collection: &Collection) -> MetaResult<Vec<DdlStatement>> {
        self.save_with(collection, &HashSet::new())
    }

    /// Save with `pending` ids counted as existing relation targets.
    fn save_with(
        &self,
        collection: &Collection,
        pending: &HashSet<String>,
    ) -> MetaResult<Vec<DdlStatement>> {
        collection.validate()?;
        effective_indexes(collection)?;
        if let Some(query) = collection.options.query.as_deref().filter(|_| collection.is_view()) {
            view_dependencies(query)?;
        }

        for target in collection.relation_targets() {
            let known = target == &collection.id
                || pending.contains(target.as_str())
                || self.find_collection_by_id(target.as_str())?.is_some();
            if !known {
                return Err(MetaError::Reference {
                    missing_collection_id: target.to_string(),
                });
            }
        }

        let existing = self.find_collection_by_id(collection.id.as_str())?;
        if let Some(old) = &existing {
            if old.kind != collection.kind {
                return Err(MetaError::validation(
                    "type",
                    format!("cannot change collection type from {} to {}", old.kind, collection.kind),
                ));
            }
        }
        self.check_name_free(collection, existing.as_ref())?;

        let dependents = self.find_dependents(&collection.id)?;
        let statements = plan(existing.as_ref(), Some(collection), &dependents)?;

        let rewrites = statements.iter().any(|s| s.op == DdlOp::CopyRows);
        let renamed = existing
            .as_ref()
            .filter(|old| !old.is_view() && old.name != collection.name);
        let views = match &existing {
            Some(old) if rewrites || renamed.is_some() => self.dependent_views(&old.name)?,
            _ => Vec::new(),
        };
        let mut retargeted = views.clone();
        if let Some(old) = renamed {
            for view in &mut retargeted {
                if let Some(query) = view.options.query.as_deref() {
                    view.options.query = Some(rename_relation(query, &old.name, &collection.name)?);
                }
            }
        }

        if rewrites {
            for view in &views {
                self.tx
                    .execute_batch(&format!("DROP VIEW IF EXISTS {}", quote_ident(&view.name)))?;
            }
        }
        self.execute(&statements)?;
        if rewrites {
            for view in &retargeted {
                let recreate = plan(None, Some(view), &[])?;
                self.execute(&recreate)?;
            }
        }

        self.upsert_row(collection, existing.as_ref())?;
        if renamed.is_some() {
            // SQLite already rewrote the view bodies; keep the snapshots in step
            for (before, after) in views.iter().zip(&retargeted) {
                self.upsert_row(after, Some(before))?;
            }
        }
        log::debug!(
            "Saved collection {} ({}): {} statement(s)",
            collection.name,
            collection.id,
            statements.len()
        );
        Ok(statements)
    }

    fn check_name_free(&self, collection: &Collection, existing: Option<&Collection>) -> MetaResult<()> {
        if let Some(other) = self.find_collection_by_name(&collection.name)? {
            if other.id != collection.id {
                return Err(MetaError::Conflict {
                    on_name: collection.name.clone(),
                });
            }
            return Ok(());
        }
        // a physical table not managed as a collection (system tables included)
        let keeps_name = existing.is_some_and(|old| old.name.eq_ignore_ascii_case(&collection.name));
        if !keeps_name && schema::table_exists(self.tx.conn(), &collection.name)? {
            return Err(MetaError::Conflict {
                on_name: collection.name.clone(),
            });
        }
        Ok(())
    }

    /// View collections whose query reads from `table`.
    fn dependent_views(&self, table: &str) -> MetaResult<Vec<Collection>> {
        let table = table.to_ascii_lowercase();
        let mut out = Vec::new();
        for view in self.find_collections()?.into_iter().filter(Collection::is_view) {
            let Some(query) = view.options.query.as_deref() else {
                continue;
            };
            if view_dependencies(query)?.contains(&table) {
                out.push(view);
            }
        }
        Ok(out)
    }

    fn execute(&self, statements: &[DdlStatement]) -> MetaResult<()> {
        for stmt in statements {
            log::debug!("Executing: {}", stmt.sql);
            self.tx.execute_batch(&stmt.sql)?;
        }
        Ok(())
    }

    fn upsert_row(&self, c: &Collection, existing: Option<&Collection>) -> MetaResult<()> {
        let now = timestamp::now();
        let created = existing
            .and_then(|old| old.created.clone())
            .or_else(|| c.created.clone())
            .unwrap_or_else(|| now.clone());
        let updated = self.version_stamp(c, existing, &now)?;

        self.tx.exec(
            "INSERT INTO _collections \
                 (id, name, type, system, schema, indexes, rules, options, created, updated) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT(id) DO UPDATE SET \
                 name = excluded.name, type = excluded.type, system = excluded.system, \
                 schema = excluded.schema, indexes = excluded.indexes, rules = excluded.rules, \
                 options = excluded.options, updated = excluded.updated",
            rusqlite::params![
                c.id.as_str(),
                c.name,
                c.kind.to_string(),
                c.system,
                to_json(&c.fields)?,
                to_json(&c.indexes)?,
                to_json(&c.rules)?,
                to_json(&c.options)?,
                created,
                updated,
            ],
        )?;
        Ok(())
    }

    /// `updated` for the row about to be written.
    ///
    /// Content saved before gets the stamp it had then, so undoing a change
    /// restores the row exactly. New content is stamped `now`, or with the
    /// snapshot's own stamp when it is being created.
    fn version_stamp(
        &self,
        c: &Collection,
        existing: Option<&Collection>,
        now: &str,
    ) -> MetaResult<String> {
        if let Some(old) = existing {
            let stamp = old.updated.clone().unwrap_or_default();
            self.tx.exec(
                "INSERT OR IGNORE INTO _collection_versions (id, checksum, updated) VALUES (?1, ?2, ?3)",
                rusqlite::params![old.id.as_str(), snapshot_checksum(old)?, stamp],
            )?;
        }

        let checksum = snapshot_checksum(c)?;
        let seen = self.tx.query_row(
            "SELECT updated FROM _collection_versions WHERE id = ?1 AND checksum = ?2",
            rusqlite::params![c.id.as_str(), checksum],
            |row| row.get::<_, String>(0),
        )?;
        if let Some(stamp) = seen {
            return Ok(stamp);
        }

        let stamp = match existing {
            None => c.updated.clone().filter(|u| !u.is_empty()),
            Some(_) => None,
        }
        .unwrap_or_else(|| now.to_string());
        self.tx.exec(
            "INSERT INTO _collection_versions (id, checksum, updated) VALUES (?1, ?2, ?3)",
            rusqlite::params![c.id.as_str(), checksum, stamp],
        )?;
        Ok(stamp)
    }

    /// Drop `collection`'s table (or view) and delete its snapshot.
    ///
    /// Refuses system collections and collections still referenced by a
    /// relation field of another collection.
    pub fn delete_collection(&self, collection: &Collection) -> MetaResult<Vec<DdlStatement>> {
        self.delete_with(collection, &HashSet::new())
    }

    /// Delete, ignoring references held by collections in `leaving`.
    fn delete_with(
        &self,
        collection: &Collection,
        leaving: &HashSet<String>,
    ) -> MetaResult<Vec<DdlStatement>> {
        let persisted = self
            .find_collection_by_id(collection.id.as_str())?
            .ok_or_else(|| MetaError::not_found(format!("Collection '{}'", collection.id)))?;

        if persisted.system {
            return Err(MetaError::validation(
                "system",
                format!("system collection '{}' cannot be deleted", persisted.name),
            ));
        }

        let blocking: Vec<String> = self
            .find_dependents(&persisted.id)?
            .into_iter()
            .filter(|d| !leaving.contains(d.id.as_str()))
            .map(|d| d.name)
            .collect();
        if !blocking.is_empty() {
            return Err(MetaError::ReferentialPolicy {
                message: format!(
                    "collection '{}' is still referenced by: {}",
                    persisted.name,
                    blocking.join(", ")
                ),
            });
        }

        let statements = plan(Some(&persisted), None, &[])?;
        self.execute(&statements)?;
        self.tx
            .exec("DELETE FROM _collections WHERE id = ?1", [persisted.id.as_str()])?;
        log::debug!("Deleted collection {} ({})", persisted.name, persisted.id);
        Ok(statements)
    }

    /// Upsert a whole snapshot of collections.
    ///
    /// Collections are saved in dependency order (relation targets and view
    /// sources first); relation checks see the entire imported set. With
    /// `delete_missing`, non-system collections absent from the snapshot are
    /// deleted first, dependents before their targets.
    pub fn import_collections(
        &self,
        collections: &[Collection],
        delete_missing: bool,
    ) -> MetaResult<Vec<DdlStatement>> {
        let imported: HashSet<String> = collections.iter().map(|c| c.id.to_string()).collect();
        let mut statements = Vec::new();

        if delete_missing {
            let missing: Vec<Collection> = self
                .find_collections()?
                .into_iter()
                .filter(|c| !c.system && !imported.contains(c.id.as_str()))
                .collect();
            let leaving: HashSet<String> = missing
                .iter()
                .map(|c| c.id.to_string())
                .chain(imported.iter().cloned())
                .collect();
            for c in dependency_order(&missing).into_iter().rev() {
                statements.extend(self.delete_with(c, &leaving)?);
            }
        }

        for c in dependency_order(collections) {
            statements.extend(self.save_with(c, &imported)?);
        }
        log::debug!(
            "Imported {} collection(s), {} statement(s)",
            collections.len(),
            statements.len()
        );
        Ok(statements)
    }
}

/// Order `collections` so that relation targets and view sources come before
/// the collections depending on them. Cycles fall back to input order.
fn dependency_order(collections: &[Collection]) -> Vec<&Collection> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..collections.len()).map(|i| graph.add_node(i)).collect();
    let by_id: HashMap<&str, usize> = collections
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.as_str(), i))
        .collect();
    let by_name: HashMap<String, usize> = collections
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.to_ascii_lowercase(), i))
        .collect();

    for (i, c) in collections.iter().enumerate() {
        let mut sources: Vec<usize> = c
            .relation_targets()
            .filter_map(|t| by_id.get(t.as_str()).copied())
            .collect();
        if let Some(query) = c.options.query.as_deref().filter(|_| c.is_view()) {
            if let Ok(tables) = view_dependencies(query) {
                sources.extend(tables.iter().filter_map(|t| by_name.get(t).copied()));
            }
        }
        for source in sources.into_iter().filter(|&s| s != i) {
            graph.add_edge(nodes[source], nodes[i], ());
        }
    }

    match toposort(&graph, None) {
        Ok(sorted) => sorted.into_iter().map(|n| &collections[graph[n]]).collect(),
        Err(cycle) => {
            log::debug!(
                "Relation cycle through '{}', keeping input order",
                collections[graph[cycle.node_id()]].name
            );
            collections.iter().collect()
        }
    }
}

#[cfg(test)]
#[path = "dao_test.rs"]
mod tests;
