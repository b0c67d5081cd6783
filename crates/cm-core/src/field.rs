//! Typed field declarations.
//!
//! A [`Field`] is serialized in the collection-export shape:
//!
//! ```json
//! { "system": false, "id": "e7uz2a2n", "name": "given_name", "type": "text",
//!   "required": true, "presentable": false, "unique": false,
//!   "options": { "min": 2, "max": 48, "pattern": "^[a-zA-Z]+$" } }
//! ```
//!
//! The `type`/`options` pair is the adjacently tagged [`FieldKind`]. Every
//! options struct denies unknown keys so a typo in a migration file is
//! rejected when it is loaded instead of being dropped on the next save.

use crate::collection::CollectionId;
use crate::newtype_string::define_opaque_id;
use crate::serde_helpers::{is_false, null_as_default};
use serde::{Deserialize, Serialize};

define_opaque_id! {
    /// Opaque field handle, stable across column renames.
    pub struct FieldId;
}

/// A typed column declaration within a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(default)]
    pub system: bool,

    pub id: FieldId,

    pub name: String,

    #[serde(flatten)]
    pub kind: FieldKind,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub presentable: bool,

    /// Sugar for a single-column unique index.
    #[serde(default)]
    pub unique: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
}

impl Field {
    /// Create a non-system, optional field with default flags.
    pub fn new(id: &str, name: &str, kind: FieldKind) -> Self {
        Self {
            system: false,
            id: FieldId::new(id),
            name: name.to_string(),
            kind,
            required: false,
            presentable: false,
            unique: false,
            hidden: false,
        }
    }

    /// Builder-style setter for `required`.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Builder-style setter for `unique`.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Whether values of this field are stored as a JSON array.
    pub fn is_multi_valued(&self) -> bool {
        self.kind.is_multi_valued()
    }
}

/// Field kind with its kind-specific options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "lowercase")]
pub enum FieldKind {
    Text(TextOptions),
    Number(NumberOptions),
    Bool(BoolOptions),
    Email(DomainOptions),
    Url(DomainOptions),
    Date(DateOptions),
    Select(SelectOptions),
    Json(JsonOptions),
    File(FileOptions),
    Relation(RelationOptions),
}

impl FieldKind {
    /// The serialized kind tag (`"text"`, `"relation"`, ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text(_) => "text",
            FieldKind::Number(_) => "number",
            FieldKind::Bool(_) => "bool",
            FieldKind::Email(_) => "email",
            FieldKind::Url(_) => "url",
            FieldKind::Date(_) => "date",
            FieldKind::Select(_) => "select",
            FieldKind::Json(_) => "json",
            FieldKind::File(_) => "file",
            FieldKind::Relation(_) => "relation",
        }
    }

    /// Whether values are stored as a JSON array rather than a scalar.
    ///
    /// A relation without `maxSelect` is unbounded and therefore multi-valued.
    pub fn is_multi_valued(&self) -> bool {
        match self {
            FieldKind::Select(o) => o.max_select > 1,
            FieldKind::File(o) => o.max_select > 1,
            FieldKind::Relation(o) => o.max_select.map_or(true, |m| m > 1),
            _ => false,
        }
    }

    /// Shorthand for a `text` kind without constraints.
    pub fn text() -> Self {
        FieldKind::Text(TextOptions::default())
    }

    /// Shorthand for a `number` kind without constraints.
    pub fn number() -> Self {
        FieldKind::Number(NumberOptions::default())
    }

    /// Shorthand for a `bool` kind.
    pub fn bool() -> Self {
        FieldKind::Bool(BoolOptions {})
    }

    /// Shorthand for a single-valued relation to `collection_id`.
    pub fn relation_to(collection_id: &str) -> Self {
        FieldKind::Relation(RelationOptions {
            collection_id: CollectionId::new(collection_id),
            cascade_delete: false,
            min_select: None,
            max_select: Some(1),
            display_fields: None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct TextOptions {
    #[serde(default)]
    pub min: Option<u64>,
    #[serde(default)]
    pub max: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pattern: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autogenerate_pattern: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NumberOptions {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub only_int: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub no_decimal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoolOptions {}

/// Options shared by `email` and `url` fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct DomainOptions {
    #[serde(default)]
    pub except_domains: Option<Vec<String>>,
    #[serde(default)]
    pub only_domains: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateOptions {
    #[serde(default)]
    pub min: Option<String>,
    #[serde(default)]
    pub max: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SelectOptions {
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: Vec<String>,
    pub max_select: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct JsonOptions {
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FileOptions {
    #[serde(default, deserialize_with = "null_as_default")]
    pub mime_types: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thumbs: Vec<String>,
    pub max_select: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_size: u64,
    #[serde(default)]
    pub protected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RelationOptions {
    pub collection_id: CollectionId,
    #[serde(default)]
    pub cascade_delete: bool,
    #[serde(default)]
    pub min_select: Option<u32>,
    #[serde(default)]
    pub max_select: Option<u32>,
    #[serde(default)]
    pub display_fields: Option<Vec<String>>,
}

#[cfg(test)]
#[path = "field_test.rs"]
mod tests;
