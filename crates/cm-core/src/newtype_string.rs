//! Macro for the opaque identifier newtypes (`CollectionId`, `FieldId`).
//!
//! Both ids share one invariant: non-empty and free of whitespace. They are
//! compared byte-for-byte, never case-folded, because they are the stable
//! keys migration scripts use to address collections and columns.

/// Define an opaque, non-empty, whitespace-free identifier newtype.
///
/// Generates:
/// - The struct with `Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize`
/// - Custom `Deserialize` (rejects empty or whitespace-containing ids)
/// - `new()` (panics on invalid input), `try_new()`, `as_str()`
/// - `Display`, `AsRef<str>`, `Borrow<str>`, `PartialEq<str>`, `PartialEq<&str>`
macro_rules! define_opaque_id {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        #[serde(transparent)]
        $vis struct $Name(String);

        impl<'de> serde::Deserialize<'de> for $Name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $Name::try_new(s).ok_or_else(|| {
                    serde::de::Error::custom(concat!(
                        stringify!($Name),
                        " must be non-empty and contain no whitespace"
                    ))
                })
            }
        }

        impl $Name {
            /// Create a new id, panicking on empty or whitespace-containing input.
            ///
            /// Prefer [`try_new`](Self::try_new) when handling untrusted input.
            pub fn new(id: impl Into<String>) -> Self {
                let s = id.into();
                assert!(
                    Self::is_valid(&s),
                    concat!(stringify!($Name), " must be non-empty and contain no whitespace")
                );
                Self(s)
            }

            /// Try to create a new id, returning `None` when the input is invalid.
            pub fn try_new(id: impl Into<String>) -> Option<Self> {
                let s = id.into();
                if Self::is_valid(&s) { Some(Self(s)) } else { None }
            }

            fn is_valid(s: &str) -> bool {
                !s.is_empty() && !s.chars().any(char::is_whitespace)
            }

            /// Return the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str { &self.0 }
        }

        impl std::borrow::Borrow<str> for $Name {
            fn borrow(&self) -> &str { &self.0 }
        }

        impl PartialEq<str> for $Name {
            fn eq(&self, other: &str) -> bool { self.0 == other }
        }

        impl PartialEq<&str> for $Name {
            fn eq(&self, other: &&str) -> bool { self.0 == *other }
        }
    };
}

pub(crate) use define_opaque_id;
