//! Opaque identifier types for levels and prompt components.
//!
//! Uses the newtype pattern so a level id can never be passed where a
//! component id is expected. Ids are normalised from the backend's loose
//! wire shapes exactly once, at the boundary.

use jailbreak_api::WireId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// An id from the backend that is not a scalar or a one-element list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {kind} id: {raw}")]
pub struct MalformedId {
    pub kind: &'static str,
    pub raw: String,
}

/// Macro to define a string-backed newtype id.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an id from any string-like value.
            #[inline]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the id as a string slice.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Normalise a wire id, rejecting shapes that are not a single scalar.
            pub fn from_wire(raw: WireId) -> Result<Self, MalformedId> {
                let shown = serde_json::to_string(&raw).unwrap_or_default();
                raw.into_scalar().map(Self).ok_or(MalformedId {
                    kind: $kind,
                    raw: shown,
                })
            }

            /// Convert back to the wire shape (numeric ids go out as numbers).
            pub fn to_wire(&self) -> WireId {
                WireId::from(self.0.as_str())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(
    /// Unique identifier for a level
    LevelId,
    "level"
);

define_id!(
    /// Unique identifier for a prompt component, global across levels
    ComponentId,
    "component"
);

/// Normalise a list of wire ids, dropping duplicates but keeping first-seen order.
pub(crate) fn normalize_ids<T, F>(raw: Vec<WireId>, convert: F) -> Result<Vec<T>, MalformedId>
where
    T: PartialEq,
    F: Fn(WireId) -> Result<T, MalformedId>,
{
    let mut ids = Vec::with_capacity(raw.len());
    for item in raw {
        let id = convert(item)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}
