//! Opaque revision keys.
//!
//! A [`Key`] is an ordered tuple of one or more string components. Plain
//! revision ids are single-component keys; per-file text keys carry a leading
//! group component (`("file-id", "rev-id")`), which [`Key::prefix`] exposes for
//! grouped sorting.
//!
//! Keys order component-wise in byte order, so `"Z"` sorts before `"a"`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Component value of the distinguished "no revision" key.
pub const NULL_REVISION: &str = "null:";

/// An opaque, ordered, hashable revision identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Vec<String>);

impl Key {
    /// Build a key from its components.
    pub fn new<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(components.into_iter().map(Into::into).collect())
    }

    /// The sentinel key: the universal ancestor of every revision.
    #[must_use]
    pub fn null() -> Self {
        Self(vec![NULL_REVISION.to_string()])
    }

    /// Returns `true` for the sentinel (and for a key with no components).
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self.0.as_slice() {
            [] => true,
            [only] => only == NULL_REVISION,
            _ => false,
        }
    }

    /// All components, in order.
    #[must_use]
    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// Leading group component for compound keys, `None` for plain ones.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        match self.0.as_slice() {
            [first, _, ..] => Some(first.as_str()),
            _ => None,
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self(vec![value.to_string()])
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self(vec![value])
    }
}

impl From<&Key> for Key {
    fn from(value: &Self) -> Self {
        value.clone()
    }
}

impl<const N: usize> From<[&str; N]> for Key {
    fn from(value: [&str; N]) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [only] => f.write_str(only),
            components => write!(f, "({})", components.join(", ")),
        }
    }
}

/// Render a key list for diagnostics: `a, b, c`.
pub(crate) fn format_keys(keys: &[Key]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
