//! Identity and group reference types.

use serde::{Deserialize, Serialize};

use crate::operation::AttributeSet;

/// A user as seen by one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Backend-specific unique key (e.g. `sAMAccountName` value).
    pub key: String,
    /// Distinguished name of the user entry.
    pub dn: String,
    /// Declared attributes read from the entry.
    pub attributes: AttributeSet,
}

impl Identity {
    pub fn new(key: impl Into<String>, dn: impl Into<String>, attributes: AttributeSet) -> Self {
        Self {
            key: key.into(),
            dn: dn.into(),
            attributes,
        }
    }
}

/// Namespace a group name lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupNamespace {
    /// Custom groups under the backend's group container.
    Ordinary,
    /// Reserved groups under a dedicated built-in container.
    Builtin,
}

/// A group name plus its namespace classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupReference {
    pub name: String,
    pub namespace: GroupNamespace,
}

impl GroupReference {
    /// Reference to an ordinary group.
    pub fn ordinary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: GroupNamespace::Ordinary,
        }
    }

    /// Classify `name` against a closed set of reserved names.
    ///
    /// Membership is an exact, case-insensitive name comparison.
    pub fn classify(name: impl Into<String>, builtin: &[&str]) -> Self {
        let name = name.into();
        let namespace = if builtin.iter().any(|b| b.eq_ignore_ascii_case(&name)) {
            GroupNamespace::Builtin
        } else {
            GroupNamespace::Ordinary
        };
        Self { name, namespace }
    }

    pub fn is_builtin(&self) -> bool {
        self.namespace == GroupNamespace::Builtin
    }
}

impl std::fmt::Display for GroupReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
