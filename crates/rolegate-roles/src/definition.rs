//! Role definitions and the on-disk role record format.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ============================================================================
// Definitions
// ============================================================================

/// What a role grants on one backend.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BackendAssignment {
    /// Attribute name to value.
    #[serde(default, deserialize_with = "scalar_map")]
    pub attributes: BTreeMap<String, String>,

    /// Group names.
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl BackendAssignment {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.groups.is_empty()
    }

    /// Fold `own` over this assignment: groups are united, attributes in
    /// `own` replace inherited ones.
    pub(crate) fn overlay(&mut self, own: BackendAssignment) {
        self.groups.extend(own.groups);
        self.attributes.extend(own.attributes);
    }
}

/// The attribute and group assignments of a role, keyed by backend name.
///
/// Ordering and hashing are order-independent, so two roles with the same
/// content compare equal however their file entries were written.
pub type RoleContent = BTreeMap<String, BackendAssignment>;

/// A validated, immutable role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleDefinition {
    /// Unique key across the catalog.
    pub key: String,
    pub display_name: String,
    /// Grants management rights in front ends.
    pub admin: bool,
    /// Key of the enclosing role for sub-roles.
    pub parent: Option<String>,
    /// Effective assignments, including those inherited from the parent.
    pub backends: RoleContent,
}

impl RoleDefinition {
    /// Backends this role touches.
    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    pub fn assignment(&self, backend: &str) -> Option<&BackendAssignment> {
        self.backends.get(backend)
    }

    /// Whether the role grants at least one group on any backend.
    pub fn has_groups(&self) -> bool {
        self.backends.values().any(|a| !a.groups.is_empty())
    }

    /// Content used for duplicate detection. Backends with nothing assigned
    /// do not count.
    pub fn canonical_content(&self) -> RoleContent {
        self.backends
            .iter()
            .filter(|(_, assignment)| !assignment.is_empty())
            .map(|(backend, assignment)| (backend.clone(), assignment.clone()))
            .collect()
    }
}

// ============================================================================
// File records
// ============================================================================

/// One role as written in the roles file, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RoleRecord {
    pub display_name: Option<String>,
    #[serde(default)]
    pub admin: bool,
    pub backends: Option<BTreeMap<String, BackendAssignment>>,
    #[serde(default)]
    pub subroles: RoleRecords,
}

/// Role records in document order. Repeated keys are kept, not merged.
#[derive(Debug, Clone, Default)]
pub(crate) struct RoleRecords(pub Vec<(String, Option<RoleRecord>)>);

impl<'de> Deserialize<'de> for RoleRecords {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordsVisitor;

        impl<'de> Visitor<'de> for RecordsVisitor {
            type Value = RoleRecords;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of role keys to role definitions")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(RoleRecords::default())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut records = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, record)) = map.next_entry::<String, Option<RoleRecord>>()? {
                    records.push((key, record));
                }
                Ok(RoleRecords(records))
            }
        }

        deserializer.deserialize_map(RecordsVisitor)
    }
}

/// Attribute values are YAML scalars; numbers and booleans are kept as text.
fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(name, value)| match value {
            serde_yaml::Value::String(s) => Ok((name, s)),
            serde_yaml::Value::Number(n) => Ok((name, n.to_string())),
            serde_yaml::Value::Bool(b) => Ok((name, b.to_string())),
            _ => Err(de::Error::custom(format!(
                "attribute '{name}' must have a single scalar value"
            ))),
        })
        .collect()
}
