//! Backend capability traits
//!
//! Every operation takes a logical user key and/or an attribute set. Adapters
//! map keys to distinguished names internally; callers never pass raw DNs.

use async_trait::async_trait;

use crate::error::ConnectorResult;
use crate::identity::Identity;
use crate::operation::AttributeSet;
use crate::types::BackendType;

/// Base trait for all directory backends.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend name, as referenced by role definitions.
    fn name(&self) -> &str;

    /// Dialect of this backend.
    fn backend_type(&self) -> BackendType;

    /// Open a service session and read the base entry.
    async fn test_connection(&self) -> ConnectorResult<()>;
}

/// Capability for checking user credentials.
#[async_trait]
pub trait AuthenticateOp: Backend {
    /// Bind as the user on a fresh session.
    ///
    /// Rejected credentials are `Ok(false)`. Any other failure (unreachable
    /// server, timeout, TLS) is an error.
    async fn authenticate(&self, key: &str, secret: &str) -> ConnectorResult<bool>;
}

/// Capability for managing user entries.
#[async_trait]
pub trait UserOp: Backend {
    /// Create a user entry from the given attributes.
    ///
    /// The attribute set must carry the backend's key attribute.
    async fn create_user(&self, attributes: AttributeSet) -> ConnectorResult<Identity>;

    /// Read a user's declared attributes.
    async fn get_user(&self, key: &str) -> ConnectorResult<Identity>;

    /// Replace the given attributes on an existing user.
    async fn set_attributes(&self, key: &str, attributes: AttributeSet) -> ConnectorResult<()>;

    /// Replace a user's password.
    async fn set_password(&self, key: &str, secret: &str) -> ConnectorResult<()>;

    /// Delete a user entry.
    async fn delete_user(&self, key: &str) -> ConnectorResult<()>;
}

/// Capability for managing group memberships.
#[async_trait]
pub trait GroupOp: Backend {
    /// Add the user to each group. Existing memberships are left untouched.
    async fn add_to_groups(&self, key: &str, groups: &[String]) -> ConnectorResult<()>;

    /// Remove the user from each group. Missing memberships are ignored.
    async fn remove_from_groups(&self, key: &str, groups: &[String]) -> ConnectorResult<()>;

    /// Names of the groups the user belongs to, without duplicates.
    async fn list_groups(&self, key: &str) -> ConnectorResult<Vec<String>>;
}

/// Capability for searching users.
#[async_trait]
pub trait SearchOp: Backend {
    /// Find users whose key or naming attributes match `query`.
    async fn search_users(&self, query: &str) -> ConnectorResult<Vec<Identity>>;
}

/// The full operation set exposed to the provisioning layer.
pub trait DirectoryBackend: AuthenticateOp + UserOp + GroupOp + SearchOp {}

impl<T> DirectoryBackend for T where T: AuthenticateOp + UserOp + GroupOp + SearchOp {}
