//! Backend registry
//!
//! Builds one adapter per configured backend from a YAML file and hands them
//! out by name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use rolegate_connector::config::BackendConfig;
use rolegate_connector::error::{ConnectorError, ConnectorResult};
use rolegate_connector::traits::{Backend, DirectoryBackend};
use rolegate_connector::types::BackendType;

use crate::ad::AdConnector;
use crate::config::{ActiveDirectoryConfig, LdapConfig};
use crate::connector::LdapConnector;

/// One configured backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendEntry {
    Ldap(LdapConfig),
    Ad(ActiveDirectoryConfig),
}

impl BackendEntry {
    pub fn name(&self) -> &str {
        match self {
            BackendEntry::Ldap(config) => config.name(),
            BackendEntry::Ad(config) => config.name(),
        }
    }

    pub fn backend_type(&self) -> BackendType {
        match self {
            BackendEntry::Ldap(_) => LdapConfig::backend_type(),
            BackendEntry::Ad(_) => ActiveDirectoryConfig::backend_type(),
        }
    }

    pub fn validate(&self) -> ConnectorResult<()> {
        match self {
            BackendEntry::Ldap(config) => config.validate(),
            BackendEntry::Ad(config) => config.validate(),
        }
    }

    /// Build the adapter for this entry. Does not connect.
    pub fn build(&self) -> ConnectorResult<Arc<dyn DirectoryBackend>> {
        Ok(match self {
            BackendEntry::Ldap(config) => Arc::new(LdapConnector::new(config.clone())?),
            BackendEntry::Ad(config) => Arc::new(AdConnector::new(config.clone())?),
        })
    }
}

/// Contents of a backends file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub backends: Vec<BackendEntry>,
}

impl BackendsConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConnectorResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConnectorError::invalid_configuration(format!(
                "Failed to read backends file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> ConnectorResult<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            ConnectorError::invalid_configuration(format!("Failed to parse backends: {e}"))
        })
    }

    /// Backend names in file order.
    pub fn names(&self) -> Vec<&str> {
        self.backends.iter().map(BackendEntry::name).collect()
    }

    /// Validate every entry and reject repeated names.
    pub fn validate(&self) -> ConnectorResult<()> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.backends.len());
        for entry in &self.backends {
            entry.validate()?;
            if seen.contains(&entry.name()) {
                return Err(ConnectorError::DuplicateBackend {
                    name: entry.name().to_string(),
                });
            }
            seen.push(entry.name());
        }
        Ok(())
    }
}

/// Adapters keyed by backend name.
#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn DirectoryBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured backend.
    pub fn from_config(config: &BackendsConfig) -> ConnectorResult<Self> {
        config.validate()?;

        let mut registry = Self::new();
        for entry in &config.backends {
            registry.register(entry.build()?)?;
            info!(backend = %entry.name(), backend_type = %entry.backend_type(), "Registered backend");
        }
        Ok(registry)
    }

    /// Add a backend. Names must be unique.
    pub fn register(&mut self, backend: Arc<dyn DirectoryBackend>) -> ConnectorResult<()> {
        let name = backend.name().to_string();
        if self.backends.contains_key(&name) {
            return Err(ConnectorError::DuplicateBackend { name });
        }
        self.backends.insert(name, backend);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DirectoryBackend>> {
        self.backends.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn DirectoryBackend>)> {
        self.backends.iter().map(|(name, backend)| (name.as_str(), backend))
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}
