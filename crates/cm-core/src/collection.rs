//! Collection snapshots: the unit the meta-store persists and the planner diffs.

use crate::access_rule::validate_rule;
use crate::error::{CoreError, CoreResult};
use crate::field::{Field, FieldId, FieldKind};
use crate::ident::{is_reserved_column, is_valid_identifier};
use crate::newtype_string::define_opaque_id;
use crate::serde_helpers::null_as_default;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

define_opaque_id! {
    /// Opaque collection id, never reused.
    pub struct CollectionId;
}

/// Collection type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    #[default]
    Base,
    Auth,
    View,
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionType::Base => write!(f, "base"),
            CollectionType::Auth => write!(f, "auth"),
            CollectionType::View => write!(f, "view"),
        }
    }
}

/// The five access rules of a collection.
///
/// `None` denies every non-admin caller; `Some("")` allows any authenticated
/// caller. Strings are kept verbatim, surrounding whitespace included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rules {
    #[serde(default)]
    pub list_rule: Option<String>,
    #[serde(default)]
    pub view_rule: Option<String>,
    #[serde(default)]
    pub create_rule: Option<String>,
    #[serde(default)]
    pub update_rule: Option<String>,
    #[serde(default)]
    pub delete_rule: Option<String>,
}

/// Selects one of the five [`Rules`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    #[serde(alias = "listRule")]
    List,
    #[serde(alias = "viewRule")]
    View,
    #[serde(alias = "createRule")]
    Create,
    #[serde(alias = "updateRule")]
    Update,
    #[serde(alias = "deleteRule")]
    Delete,
}

impl RuleKind {
    pub const ALL: [RuleKind; 5] = [
        RuleKind::List,
        RuleKind::View,
        RuleKind::Create,
        RuleKind::Update,
        RuleKind::Delete,
    ];

    /// The serialized key (`listRule`, ...).
    pub fn key(self) -> &'static str {
        match self {
            RuleKind::List => "listRule",
            RuleKind::View => "viewRule",
            RuleKind::Create => "createRule",
            RuleKind::Update => "updateRule",
            RuleKind::Delete => "deleteRule",
        }
    }
}

impl Rules {
    pub fn get(&self, kind: RuleKind) -> Option<&str> {
        self.slot(kind).as_deref()
    }

    pub fn set(&mut self, kind: RuleKind, value: Option<String>) {
        *self.slot_mut(kind) = value;
    }

    fn slot(&self, kind: RuleKind) -> &Option<String> {
        match kind {
            RuleKind::List => &self.list_rule,
            RuleKind::View => &self.view_rule,
            RuleKind::Create => &self.create_rule,
            RuleKind::Update => &self.update_rule,
            RuleKind::Delete => &self.delete_rule,
        }
    }

    fn slot_mut(&mut self, kind: RuleKind) -> &mut Option<String> {
        match kind {
            RuleKind::List => &mut self.list_rule,
            RuleKind::View => &mut self.view_rule,
            RuleKind::Create => &mut self.create_rule,
            RuleKind::Update => &mut self.update_rule,
            RuleKind::Delete => &mut self.delete_rule,
        }
    }
}

/// Collection-level options.
///
/// `query` backs view collections; everything else (auth provider settings,
/// password policy, ...) is kept as an opaque bag and written back verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A named, typed set of records with schema, indexes and access rules.
///
/// Decoding rejects unknown top-level keys, so a misspelt rule name fails
/// instead of silently leaving the rule unset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    pub id: CollectionId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,

    pub name: String,

    #[serde(rename = "type")]
    pub kind: CollectionType,

    pub system: bool,

    #[serde(rename = "schema")]
    pub fields: Vec<Field>,

    pub indexes: Vec<String>,

    #[serde(flatten)]
    pub rules: Rules,

    pub options: CollectionOptions,
}

/// Wire shape of [`Collection`]; `unknown` collects keys nothing else claims.
#[derive(Deserialize)]
struct CollectionDoc {
    id: CollectionId,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    name: String,
    #[serde(rename = "type", default)]
    kind: CollectionType,
    #[serde(default)]
    system: bool,
    #[serde(rename = "schema", default, deserialize_with = "null_as_default")]
    fields: Vec<Field>,
    #[serde(default, deserialize_with = "null_as_default")]
    indexes: Vec<String>,
    #[serde(flatten)]
    rules: Rules,
    #[serde(default, deserialize_with = "null_as_default")]
    options: CollectionOptions,
    #[serde(flatten)]
    unknown: serde_json::Map<String, serde_json::Value>,
}

impl<'de> Deserialize<'de> for Collection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let doc = CollectionDoc::deserialize(deserializer)?;
        if let Some(key) = doc.unknown.keys().next() {
            return Err(serde::de::Error::custom(format!(
                "unknown field `{key}` in collection '{}'",
                doc.name
            )));
        }
        Ok(Self {
            id: doc.id,
            created: doc.created,
            updated: doc.updated,
            name: doc.name,
            kind: doc.kind,
            system: doc.system,
            fields: doc.fields,
            indexes: doc.indexes,
            rules: doc.rules,
            options: doc.options,
        })
    }
}

impl Collection {
    /// Create an empty collection of the given type.
    pub fn new(id: &str, name: &str, kind: CollectionType) -> Self {
        Self {
            id: CollectionId::new(id),
            created: None,
            updated: None,
            name: name.to_string(),
            kind,
            system: false,
            fields: Vec::new(),
            indexes: Vec::new(),
            rules: Rules::default(),
            options: CollectionOptions::default(),
        }
    }

    /// Decode a collection from its JSON export.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::CollectionParse {
            message: e.to_string(),
        })
    }

    /// Decode a collection from an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> CoreResult<Self> {
        serde_json::from_value(value).map_err(|e| CoreError::CollectionParse {
            message: e.to_string(),
        })
    }

    pub fn is_auth(&self) -> bool {
        self.kind == CollectionType::Auth
    }

    pub fn is_view(&self) -> bool {
        self.kind == CollectionType::View
    }

    pub fn field_by_id(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Field lookup by column name (case-insensitive, like SQLite).
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Add a field, replacing in place any declaration with the same id.
    pub fn add_field(&mut self, field: Field) {
        match self.fields.iter_mut().find(|f| f.id == field.id) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Add a field at `index` (clamped to the end). An existing declaration
    /// with the same id is removed first, so the field moves.
    pub fn add_field_at(&mut self, index: usize, field: Field) {
        self.fields.retain(|f| f.id != field.id);
        let at = index.min(self.fields.len());
        self.fields.insert(at, field);
    }

    /// Remove a field by id. Ids are the only supported delete key.
    pub fn remove_field(&mut self, id: &str) -> Option<Field> {
        let pos = self.fields.iter().position(|f| f.id == id)?;
        Some(self.fields.remove(pos))
    }

    /// Ids of all collections referenced by relation fields.
    pub fn relation_targets(&self) -> impl Iterator<Item = &CollectionId> {
        self.fields.iter().filter_map(|f| match &f.kind {
            FieldKind::Relation(opts) => Some(&opts.collection_id),
            _ => None,
        })
    }

    /// Whether any relation field of this collection points at `target`.
    pub fn references(&self, target: &CollectionId) -> bool {
        self.relation_targets().any(|id| id == target)
    }

    /// Check every constraint that can be decided from the snapshot alone.
    ///
    /// Cross-collection checks (relation targets exist, names are unique,
    /// index SQL parses) belong to the meta-store, which can see the other
    /// collections and the SQL parser.
    pub fn validate(&self) -> CoreResult<()> {
        if !is_valid_identifier(&self.name) {
            return Err(CoreError::validation(
                "name",
                format!("'{}' is not a valid identifier", self.name),
            ));
        }

        let mut ids: HashSet<&FieldId> = HashSet::new();
        let mut names: HashSet<String> = HashSet::new();
        for field in &self.fields {
            let path = format!("schema.{}", field.name);
            if !ids.insert(&field.id) {
                return Err(CoreError::validation(
                    path,
                    format!("duplicate field id '{}'", field.id),
                ));
            }
            if !is_valid_identifier(&field.name) {
                return Err(CoreError::validation(path, "not a valid identifier"));
            }
            if !names.insert(field.name.to_ascii_lowercase()) {
                return Err(CoreError::validation(path, "duplicate field name"));
            }
            if is_reserved_column(&field.name, self.is_auth()) && !is_primary_key_override(field) {
                return Err(CoreError::validation(path, "reserved system column name"));
            }
            validate_kind(field, &path)?;
        }

        for kind in RuleKind::ALL {
            if let Some(rule) = self.rules.get(kind) {
                validate_rule(kind.key(), rule)?;
            }
        }

        if self.is_view() {
            self.validate_view()?;
        }
        Ok(())
    }

    fn validate_view(&self) -> CoreResult<()> {
        let has_query = self
            .options
            .query
            .as_deref()
            .is_some_and(|q| !q.trim().is_empty());
        if !has_query {
            return Err(CoreError::validation("options.query", "view requires a query"));
        }
        if !self.indexes.is_empty() {
            return Err(CoreError::validation("indexes", "views cannot have indexes"));
        }
        for kind in [RuleKind::Create, RuleKind::Update, RuleKind::Delete] {
            if self.rules.get(kind).is_some() {
                return Err(CoreError::validation(kind.key(), "views are read-only"));
            }
        }
        Ok(())
    }

    /// Serialize to the canonical JSON form stored in `_collections`.
    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string(self).map_err(|e| CoreError::CollectionParse {
            message: e.to_string(),
        })
    }
}

/// A text field named `id` with `primaryKey` replaces the system id column.
pub fn is_primary_key_override(field: &Field) -> bool {
    field.name == "id" && matches!(&field.kind, FieldKind::Text(o) if o.primary_key)
}

fn validate_kind(field: &Field, path: &str) -> CoreResult<()> {
    match &field.kind {
        FieldKind::Select(o) => {
            if o.max_select < 1 {
                return Err(CoreError::validation(path, "maxSelect must be at least 1"));
            }
            if o.values.is_empty() {
                return Err(CoreError::validation(path, "select needs at least one value"));
            }
        }
        FieldKind::File(o) if o.max_select < 1 => {
            return Err(CoreError::validation(path, "maxSelect must be at least 1"));
        }
        FieldKind::Relation(o) => {
            if o.max_select == Some(0) {
                return Err(CoreError::validation(path, "maxSelect must be at least 1"));
            }
            if let (Some(min), Some(max)) = (o.min_select, o.max_select) {
                if min > max {
                    return Err(CoreError::validation(path, "minSelect exceeds maxSelect"));
                }
            }
        }
        FieldKind::Text(o) => {
            if let (Some(min), Some(max)) = (o.min, o.max) {
                if min > max {
                    return Err(CoreError::validation(path, "min exceeds max"));
                }
            }
            if o.primary_key && field.name != "id" {
                return Err(CoreError::validation(path, "only the id field can be the primary key"));
            }
        }
        FieldKind::Number(o) => {
            if let (Some(min), Some(max)) = (o.min, o.max) {
                if min > max {
                    return Err(CoreError::validation(path, "min exceeds max"));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
#[path = "collection_test.rs"]
mod tests;
