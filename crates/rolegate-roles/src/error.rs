//! Role engine error types

use thiserror::Error;

/// Coarse classification of a [`RoleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleErrorKind {
    /// The roles file is absent, unreadable or invalid. Fatal at load time.
    Configuration,
    /// A referenced role does not exist.
    NotFound,
}

/// Error raised while loading or querying the role catalog.
#[derive(Debug, Error)]
pub enum RoleError {
    /// The roles file does not exist.
    #[error("roles file {path} does not exist")]
    MissingRolesFile { path: String },

    /// The roles file exists but could not be read.
    #[error("failed to read roles file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The roles file is not valid YAML or has the wrong shape.
    #[error("invalid roles file: {message}")]
    Parse { message: String },

    /// A role lacks a mandatory key.
    #[error("role '{role}' is missing required key '{key}'")]
    MissingKey { role: String, key: &'static str },

    /// Two roles share a key.
    #[error("role key '{role}' is defined more than once")]
    DuplicateRoleKey { role: String },

    /// Two roles grant exactly the same attributes and groups.
    #[error("role '{role}' grants exactly the same content as role '{duplicate_of}'")]
    DuplicateRoleContent { role: String, duplicate_of: String },

    /// A role references a backend that is not configured.
    #[error("role '{role}' references unknown backend '{backend}'")]
    UnknownBackend { role: String, backend: String },

    /// The requested role is not in the catalog.
    #[error("role '{role}' does not exist")]
    UnknownRole { role: String },
}

impl RoleError {
    #[must_use]
    pub fn kind(&self) -> RoleErrorKind {
        match self {
            RoleError::UnknownRole { .. } => RoleErrorKind::NotFound,
            _ => RoleErrorKind::Configuration,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == RoleErrorKind::Configuration
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == RoleErrorKind::NotFound
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            RoleError::MissingRolesFile { .. } => "MISSING_ROLES_FILE",
            RoleError::Io { .. } => "ROLES_FILE_UNREADABLE",
            RoleError::Parse { .. } => "ROLES_FILE_INVALID",
            RoleError::MissingKey { .. } => "MISSING_KEY",
            RoleError::DuplicateRoleKey { .. } => "DUPLICATE_ROLE_KEY",
            RoleError::DuplicateRoleContent { .. } => "DUPLICATE_ROLE_CONTENT",
            RoleError::UnknownBackend { .. } => "UNKNOWN_BACKEND",
            RoleError::UnknownRole { .. } => "UNKNOWN_ROLE",
        }
    }
}

impl From<serde_yaml::Error> for RoleError {
    fn from(err: serde_yaml::Error) -> Self {
        RoleError::Parse {
            message: err.to_string(),
        }
    }
}

/// Result type for role engine operations.
pub type RoleResult<T> = Result<T, RoleError>;
