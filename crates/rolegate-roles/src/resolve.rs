//! Resolution of selected roles into per-backend deltas.
//!
//! Groups accumulate as a set union per backend. Attributes are merged in
//! selection order: a later role overwrites an earlier one for the same
//! `(backend, attribute)` and the overwrite is recorded as a conflict.
//! Attribute names compare case-insensitively, as directories compare them.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use rolegate_connector::operation::AttributeSet;

use crate::catalog::RoleCatalog;
use crate::error::RoleResult;

/// Changes to apply on one backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackendDelta {
    pub attributes: BTreeMap<String, String>,
    pub groups: BTreeSet<String>,
}

impl BackendDelta {
    /// Attributes as an adapter attribute set.
    pub fn attribute_set(&self) -> AttributeSet {
        self.attributes
            .iter()
            .fold(AttributeSet::new(), |set, (name, value)| {
                set.with(name.clone(), value.clone())
            })
    }

    /// Groups as a list, sorted by name.
    pub fn group_list(&self) -> Vec<String> {
        self.groups.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.groups.is_empty()
    }

    /// Set `name` to `value`, replacing any spelling of the same attribute.
    /// Returns the replaced value.
    fn assign(&mut self, name: &str, value: &str) -> Option<String> {
        let existing = self
            .attributes
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned();
        let previous = existing.and_then(|k| self.attributes.remove(&k));
        self.attributes.insert(name.to_string(), value.to_string());
        previous
    }
}

/// A role and the value it assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeSource {
    pub role: String,
    pub value: String,
}

/// Two selected roles assigned different values to one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeConflict {
    pub backend: String,
    pub attribute: String,
    /// The overwritten assignment.
    pub previous: AttributeSource,
    /// The assignment that was kept.
    pub winner: AttributeSource,
}

/// Result of resolving a role selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleDelta {
    backends: BTreeMap<String, BackendDelta>,
    conflicts: Vec<AttributeConflict>,
}

impl RoleDelta {
    pub fn backend(&self, name: &str) -> Option<&BackendDelta> {
        self.backends.get(name)
    }

    pub fn backends(&self) -> impl Iterator<Item = (&str, &BackendDelta)> {
        self.backends.iter().map(|(name, delta)| (name.as_str(), delta))
    }

    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    /// Attribute overwrites between selected roles, in the order they happened.
    pub fn conflicts(&self) -> &[AttributeConflict] {
        &self.conflicts
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.values().all(BackendDelta::is_empty)
    }

    pub fn into_backends(self) -> BTreeMap<String, BackendDelta> {
        self.backends
    }
}

impl RoleCatalog {
    /// Merge the selected roles, in the given order, into per-backend deltas.
    ///
    /// Fails with [`RoleError::UnknownRole`](crate::RoleError::UnknownRole) if
    /// any key is not in the catalog; nothing is resolved in that case.
    pub fn resolve<S: AsRef<str>>(&self, keys: &[S]) -> RoleResult<RoleDelta> {
        let roles = keys
            .iter()
            .map(|key| self.require(key.as_ref()))
            .collect::<RoleResult<Vec<_>>>()?;

        let mut delta = RoleDelta::default();
        // (backend, lowercased attribute) -> role that last assigned it
        let mut sources: BTreeMap<(String, String), String> = BTreeMap::new();

        for role in roles {
            for (backend, assignment) in &role.backends {
                let target = delta.backends.entry(backend.clone()).or_default();
                target.groups.extend(assignment.groups.iter().cloned());

                for (attribute, value) in &assignment.attributes {
                    let previous = target.assign(attribute, value);
                    let previous_role = sources.insert(
                        (backend.clone(), attribute.to_ascii_lowercase()),
                        role.key.clone(),
                    );

                    if let (Some(previous), Some(previous_role)) = (previous, previous_role) {
                        if previous != *value {
                            warn!(
                                backend = %backend,
                                attribute = %attribute,
                                overwritten_role = %previous_role,
                                role = %role.key,
                                "Conflicting attribute values in role selection, last role wins"
                            );
                            delta.conflicts.push(AttributeConflict {
                                backend: backend.clone(),
                                attribute: attribute.clone(),
                                previous: AttributeSource {
                                    role: previous_role,
                                    value: previous,
                                },
                                winner: AttributeSource {
                                    role: role.key.clone(),
                                    value: value.clone(),
                                },
                            });
                        }
                    }
                }
            }
        }

        debug!(
            roles = keys.len(),
            backends = delta.backends.len(),
            conflicts = delta.conflicts.len(),
            "Resolved role selection"
        );
        Ok(delta)
    }

    /// Per-backend union of the groups granted by the selected roles.
    pub fn groups_of<S: AsRef<str>>(
        &self,
        keys: &[S],
    ) -> RoleResult<BTreeMap<String, BTreeSet<String>>> {
        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for key in keys {
            let role = self.require(key.as_ref())?;
            for (backend, assignment) in &role.backends {
                if !assignment.groups.is_empty() {
                    groups
                        .entry(backend.clone())
                        .or_default()
                        .extend(assignment.groups.iter().cloned());
                }
            }
        }
        Ok(groups)
    }
}
