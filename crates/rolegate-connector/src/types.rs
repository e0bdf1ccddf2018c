//! Backend type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Directory dialect a backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Standard LDAPv3 directory with a configured schema.
    Ldap,
    /// Microsoft Active Directory (or Samba AD).
    Ad,
}

impl BackendType {
    /// Get all available backend types.
    #[must_use]
    pub fn all() -> &'static [BackendType] {
        &[BackendType::Ldap, BackendType::Ad]
    }

    /// Get the string representation used in configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Ldap => "ldap",
            BackendType::Ad => "ad",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = ParseBackendTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ldap" => Ok(BackendType::Ldap),
            "ad" | "activedirectory" | "active_directory" => Ok(BackendType::Ad),
            _ => Err(ParseBackendTypeError(s.to_string())),
        }
    }
}

/// Error parsing a backend type from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBackendTypeError(String);

impl fmt::Display for ParseBackendTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown backend type: {}", self.0)
    }
}

impl std::error::Error for ParseBackendTypeError {}
