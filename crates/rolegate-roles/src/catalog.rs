//! Role catalog loading and queries
//!
//! A catalog is built by one validating pass over a roles file. Sub-roles are
//! flattened into the catalog under their own keys and inherit what their
//! parent grants. Each role is checked as it is inserted: required keys first,
//! then key uniqueness, then content uniqueness.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::definition::{RoleContent, RoleDefinition, RoleRecord, RoleRecords};
use crate::error::{RoleError, RoleResult};

/// Validated, immutable set of roles.
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    /// Roles in document order, parents before their sub-roles.
    roles: Vec<RoleDefinition>,
    index: HashMap<String, usize>,
}

/// Accumulates roles while checking key and content uniqueness.
#[derive(Default)]
struct CatalogBuilder {
    catalog: RoleCatalog,
    contents: BTreeMap<RoleContent, String>,
}

impl CatalogBuilder {
    fn insert(&mut self, role: RoleDefinition) -> RoleResult<()> {
        if self.catalog.index.contains_key(&role.key) {
            return Err(RoleError::DuplicateRoleKey { role: role.key });
        }

        let content = role.canonical_content();
        if let Some(existing) = self.contents.get(&content) {
            return Err(RoleError::DuplicateRoleContent {
                role: role.key,
                duplicate_of: existing.clone(),
            });
        }
        self.contents.insert(content, role.key.clone());

        debug!(role = %role.key, parent = ?role.parent, "Loaded role");
        self.catalog
            .index
            .insert(role.key.clone(), self.catalog.roles.len());
        self.catalog.roles.push(role);
        Ok(())
    }

    fn add_records(&mut self, records: RoleRecords, parent: Option<&RoleDefinition>) -> RoleResult<()> {
        for (key, record) in records.0 {
            let record: RoleRecord = record.unwrap_or_default();

            let display_name = record
                .display_name
                .filter(|name| !name.trim().is_empty())
                .ok_or_else(|| RoleError::MissingKey {
                    role: key.clone(),
                    key: "display_name",
                })?;
            let own = record
                .backends
                .filter(|backends| !backends.is_empty())
                .ok_or_else(|| RoleError::MissingKey {
                    role: key.clone(),
                    key: "backends",
                })?;

            let backends = match parent {
                Some(parent) => {
                    let mut inherited = parent.backends.clone();
                    for (backend, assignment) in own {
                        inherited.entry(backend).or_default().overlay(assignment);
                    }
                    inherited
                }
                None => own,
            };

            let role = RoleDefinition {
                key,
                display_name,
                admin: record.admin,
                parent: parent.map(|p| p.key.clone()),
                backends,
            };
            self.insert(role.clone())?;
            self.add_records(record.subroles, Some(&role))?;
        }
        Ok(())
    }
}

impl RoleCatalog {
    /// Load and validate a roles file.
    ///
    /// A missing file is [`RoleError::MissingRolesFile`], reported before any
    /// read or parse is attempted.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(path: P) -> RoleResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RoleError::MissingRolesFile {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| RoleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_yaml(&content)?;

        info!(path = %path.display(), roles = catalog.len(), "Role catalog loaded");
        Ok(catalog)
    }

    /// Parse and validate roles from a YAML string.
    pub fn from_yaml(content: &str) -> RoleResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let records: RoleRecords = serde_yaml::from_str(content)?;

        let mut builder = CatalogBuilder::default();
        builder.add_records(records, None)?;
        Ok(builder.catalog)
    }

    pub fn get(&self, key: &str) -> Option<&RoleDefinition> {
        self.index.get(key).map(|&i| &self.roles[i])
    }

    /// Like [`get`](Self::get), failing with [`RoleError::UnknownRole`].
    pub fn require(&self, key: &str) -> RoleResult<&RoleDefinition> {
        self.get(key).ok_or_else(|| RoleError::UnknownRole {
            role: key.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn display_name(&self, key: &str) -> Option<&str> {
        self.get(key).map(|role| role.display_name.as_str())
    }

    /// Role keys in document order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|role| role.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleDefinition> {
        self.roles.iter()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Keys of roles flagged `admin`.
    pub fn admin_roles(&self) -> Vec<&str> {
        self.roles
            .iter()
            .filter(|role| role.admin)
            .map(|role| role.key.as_str())
            .collect()
    }

    /// Every backend name referenced by some role.
    pub fn backend_names(&self) -> BTreeSet<&str> {
        self.roles.iter().flat_map(|role| role.backend_names()).collect()
    }

    /// Fail with [`RoleError::UnknownBackend`] if a role references a backend
    /// outside `known`.
    pub fn check_backends<S: AsRef<str>>(&self, known: &[S]) -> RoleResult<()> {
        for role in &self.roles {
            for backend in role.backend_names() {
                if !known.iter().any(|k| k.as_ref() == backend) {
                    return Err(RoleError::UnknownBackend {
                        role: role.key.clone(),
                        backend: backend.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
