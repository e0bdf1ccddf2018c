//! Backend configuration primitives
//!
//! Base trait and common configuration structures shared by every dialect.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConnectorError, ConnectorResult};
use crate::types::BackendType;

/// Placeholder written in place of secrets by [`BackendConfig::redacted`].
pub const REDACTED: &str = "***REDACTED***";

/// Trait for dialect-specific backend configuration.
pub trait BackendConfig: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Get the backend type this configuration is for.
    fn backend_type() -> BackendType;

    /// Backend name used by roles to address this backend.
    fn name(&self) -> &str;

    /// Validate the configuration.
    ///
    /// Runs before any network connection is attempted.
    fn validate(&self) -> ConnectorResult<()>;

    /// Create a redacted version of this config (for logging/display).
    fn redacted(&self) -> Self;
}

/// Connection settings shared across dialects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Connect and per-operation timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    1
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

impl ConnectionSettings {
    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Get the timeout as Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// A zero timeout would fail every exchange, so it is rejected at load.
    pub fn validate(&self, backend: &str) -> ConnectorResult<()> {
        if self.timeout_secs == 0 {
            return Err(ConnectorError::InvalidConfiguration {
                message: format!("backend '{backend}': connection.timeout_secs must be at least 1"),
            });
        }
        Ok(())
    }
}

/// TLS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Whether to verify the server certificate.
    #[serde(default = "default_true")]
    pub verify_certificate: bool,

    /// Upgrade a plain `ldap://` connection with STARTTLS.
    #[serde(default)]
    pub starttls: bool,

    /// Path to a PEM CA certificate used to verify the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            verify_certificate: true,
            starttls: false,
            ca_cert_path: None,
        }
    }
}

impl TlsConfig {
    /// Fail if a CA file is configured but absent.
    pub fn validate(&self) -> ConnectorResult<()> {
        if let Some(path) = &self.ca_cert_path {
            if !Path::new(path).is_file() {
                return Err(ConnectorError::CaFileNotFound { path: path.clone() });
            }
        }
        Ok(())
    }

    /// Log a warning when certificate verification is disabled.
    pub fn validate_security(&self) {
        if !self.verify_certificate {
            tracing::warn!(
                target: "security",
                "TLS certificate verification is disabled for this backend"
            );
        }
    }
}

/// Parse and check a directory server URI (`ldap://` or `ldaps://`).
pub fn parse_directory_uri(uri: &str) -> ConnectorResult<url::Url> {
    let parsed = url::Url::parse(uri).map_err(|e| ConnectorError::InvalidConfiguration {
        message: format!("invalid uri '{uri}': {e}"),
    })?;

    match parsed.scheme() {
        "ldap" | "ldaps" => {}
        other => {
            return Err(ConnectorError::InvalidConfiguration {
                message: format!("unsupported uri scheme '{other}' in '{uri}'"),
            })
        }
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ConnectorError::InvalidConfiguration {
            message: format!("uri '{uri}' has no host"),
        });
    }

    Ok(parsed)
}

/// Resolve a value that may be overridden from the process environment.
///
/// When `env_var` is set and present in the environment, its value wins over
/// `configured`.
pub fn env_override(configured: Option<&str>, env_var: Option<&str>) -> Option<String> {
    env_var
        .and_then(|name| std::env::var(name).ok())
        .or_else(|| configured.map(str::to_string))
}
