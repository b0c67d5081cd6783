//! cm-core - Core library for colmig
//!
//! This crate provides the collection meta-model (collections, typed fields,
//! access rules, index declarations), identifier checks, the access-rule
//! grammar validator, and configuration parsing shared by all colmig crates.

pub mod access_rule;
pub mod collection;
pub mod config;
pub mod error;
pub mod field;
pub mod ident;
mod newtype_string;
pub(crate) mod serde_helpers;

pub use access_rule::validate_rule;
pub use collection::{Collection, CollectionId, CollectionOptions, CollectionType, RuleKind, Rules};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use field::{
    DateOptions, DomainOptions, Field, FieldId, FieldKind, FileOptions, JsonOptions,
    NumberOptions, RelationOptions, SelectOptions, TextOptions,
};
