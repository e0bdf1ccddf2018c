//! Reverse lookup: which roles does a user already hold?

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::RoleCatalog;

/// Roles matched from a user's current group memberships.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleMatch {
    /// Keys of roles whose every group the user holds.
    pub roles: BTreeSet<String>,
    /// The user's groups, per backend, not granted by any matched role.
    pub unmatched: BTreeMap<String, BTreeSet<String>>,
}

fn holds(groups: Option<&Vec<String>>, group: &str) -> bool {
    groups.is_some_and(|held| held.iter().any(|g| g.eq_ignore_ascii_case(group)))
}

impl RoleCatalog {
    /// Match a user's groups, keyed by backend, against the catalog.
    ///
    /// Group names compare case-insensitively. Roles that grant no group
    /// never match.
    pub fn roles_of(&self, user_groups: &BTreeMap<String, Vec<String>>) -> RoleMatch {
        let mut matched = RoleMatch::default();
        let mut covered: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for role in self.iter().filter(|role| role.has_groups()) {
            let all_held = role.backends.iter().all(|(backend, assignment)| {
                assignment
                    .groups
                    .iter()
                    .all(|group| holds(user_groups.get(backend), group))
            });
            if !all_held {
                continue;
            }

            matched.roles.insert(role.key.clone());
            for (backend, assignment) in &role.backends {
                covered
                    .entry(backend.as_str())
                    .or_default()
                    .extend(assignment.groups.iter().map(String::as_str));
            }
        }

        for (backend, groups) in user_groups {
            let granted = covered.get(backend.as_str());
            let rest: BTreeSet<String> = groups
                .iter()
                .filter(|group| {
                    !granted.is_some_and(|g| g.iter().any(|c| c.eq_ignore_ascii_case(group)))
                })
                .cloned()
                .collect();
            if !rest.is_empty() {
                matched.unmatched.insert(backend.clone(), rest);
            }
        }

        matched
    }
}
