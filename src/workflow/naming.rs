//! Execution-engine identifiers
//!
//! Argo rejects underscores in template and task names, so every name that ends
//! up as a task name, a template name or a dependency reference goes through
//! [`Identifier::normalize`]. A task routes to its template by name, which is why
//! both sides are the same type and there is no other way to build one.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A normalized task/template name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Replace every underscore with a hyphen. No case folding, no truncation.
    pub fn normalize(name: &str) -> Self {
        Identifier(name.replace('_', "-"))
    }

    /// Normalize each name of a dependency list, preserving order
    pub fn normalize_all<S: AsRef<str>>(names: &[S]) -> Vec<Self> {
        names.iter().map(|n| Self::normalize(n.as_ref())).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// Names read back from the cluster are normalized again; normalizing is idempotent.
impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Identifier::normalize(&raw))
    }
}

/// Short form of a parent name: the first character of every `-`, `_`, `.` or
/// whitespace separated segment, lowercased.
///
/// `bookinfo` -> `b`, `my_shop-api` -> `msa`
pub fn to_initials(name: &str) -> String {
    name.split(|c: char| c == '-' || c == '_' || c == '.' || c.is_whitespace())
        .filter_map(|segment| segment.chars().next())
        .flat_map(char::to_lowercase)
        .collect()
}
