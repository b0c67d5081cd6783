//! Shared serde helper functions used across the meta-model.

use serde::{Deserialize, Deserializer};

/// Deserialize an explicit JSON `null` as the type's default.
///
/// Collection exports write `"mimeTypes": null`, `"pattern": null` and
/// similar; the meta-model treats those the same as an absent key.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `skip_serializing_if` predicate for `false` flags.
pub fn is_false(value: &bool) -> bool {
    !*value
}
