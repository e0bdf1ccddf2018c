//! Connector error types
//!
//! Error definitions classified by the taxonomy the provisioning layer acts on:
//! configuration, not-found, connection, operation, partial provisioning.

use std::fmt;

use thiserror::Error;

/// Follow-up step of a multi-step user creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisioningStep {
    /// Writing the initial password after the entry was added.
    SetPassword,
    /// Writing the account-control flags that enable the account.
    EnableAccount,
}

impl ProvisioningStep {
    /// Stable name used in logs and error messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningStep::SetPassword => "set_password",
            ProvisioningStep::EnableAccount => "enable_account",
        }
    }
}

impl fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a [`ConnectorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Fatal at initialization; never retried.
    Configuration,
    /// The referenced user, group or entry does not exist.
    NotFound,
    /// Timeout, TLS failure, unreachable server, rejected service bind.
    Connection,
    /// The directory refused or failed an operation.
    Operation,
    /// An entry was created but a follow-up modification failed.
    PartialProvisioning,
    /// A session was used outside the `Bound` state.
    Programming,
}

/// Error that can occur during directory backend operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Connection errors
    /// Failed to establish or keep a connection to the directory server.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connect or operation timeout elapsed.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// The directory rejected a bind with the supplied credentials.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    // Configuration errors
    /// Backend configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A dialect-required attribute is missing from the declared attribute list.
    #[error("backend '{backend}': attribute '{attribute}' must be declared in the attribute list")]
    MissingRequiredAttribute { backend: String, attribute: String },

    /// The configured CA certificate file does not exist.
    #[error("CA file {path} does not exist")]
    CaFileNotFound { path: String },

    /// Two backends were configured under the same name.
    #[error("backend '{name}' is configured more than once")]
    DuplicateBackend { name: String },

    // Not-found errors
    /// No user with this key exists in the backend.
    #[error("user '{key}' does not exist")]
    UserNotFound { key: String },

    /// No group entry exists for this group reference.
    #[error("group '{group}' does not exist")]
    GroupNotFound { group: String },

    /// The entry addressed by this DN does not exist.
    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    // Operation errors
    /// Entry already exists (create conflict).
    #[error("object already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    /// Operation failed.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Input data cannot be expressed for this backend.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    // Partial provisioning
    /// The user entry exists but a follow-up step did not complete.
    #[error("user '{key}' created at {dn} but step '{step}' failed: {source}")]
    PartiallyProvisioned {
        key: String,
        dn: String,
        step: ProvisioningStep,
        #[source]
        source: Box<ConnectorError>,
    },

    // Programming errors
    /// A directory operation was attempted on a session that is not bound.
    #[error("directory session is {state}, cannot {operation}")]
    SessionNotBound {
        operation: &'static str,
        state: &'static str,
    },
}

impl ConnectorError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::ConnectionFailed { .. }
            | ConnectorError::ConnectionTimeout { .. }
            | ConnectorError::AuthenticationFailed => ErrorKind::Connection,
            ConnectorError::InvalidConfiguration { .. }
            | ConnectorError::MissingRequiredAttribute { .. }
            | ConnectorError::CaFileNotFound { .. }
            | ConnectorError::DuplicateBackend { .. } => ErrorKind::Configuration,
            ConnectorError::UserNotFound { .. }
            | ConnectorError::GroupNotFound { .. }
            | ConnectorError::ObjectNotFound { .. } => ErrorKind::NotFound,
            ConnectorError::ObjectAlreadyExists { .. }
            | ConnectorError::OperationFailed { .. }
            | ConnectorError::InvalidData { .. } => ErrorKind::Operation,
            ConnectorError::PartiallyProvisioned { .. } => ErrorKind::PartialProvisioning,
            ConnectorError::SessionNotBound { .. } => ErrorKind::Programming,
        }
    }

    /// Whether the caller can fix this by correcting its input.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether this error must be fixed in configuration.
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            ConnectorError::AuthenticationFailed => "AUTH_FAILED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::MissingRequiredAttribute { .. } => "MISSING_REQUIRED_ATTRIBUTE",
            ConnectorError::CaFileNotFound { .. } => "CA_FILE_NOT_FOUND",
            ConnectorError::DuplicateBackend { .. } => "DUPLICATE_BACKEND",
            ConnectorError::UserNotFound { .. } => "USER_NOT_FOUND",
            ConnectorError::GroupNotFound { .. } => "GROUP_NOT_FOUND",
            ConnectorError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            ConnectorError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            ConnectorError::OperationFailed { .. } => "OPERATION_FAILED",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
            ConnectorError::PartiallyProvisioned { .. } => "PARTIALLY_PROVISIONED",
            ConnectorError::SessionNotBound { .. } => "SESSION_NOT_BOUND",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Wrap a failed follow-up step of user creation.
    pub fn partially_provisioned(
        key: impl Into<String>,
        dn: impl Into<String>,
        step: ProvisioningStep,
        source: ConnectorError,
    ) -> Self {
        ConnectorError::PartiallyProvisioned {
            key: key.into(),
            dn: dn.into(),
            step,
            source: Box::new(source),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
