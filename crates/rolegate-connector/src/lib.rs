//! # Directory Adapter Framework
//!
//! Backend-neutral abstractions for provisioning users and group memberships
//! into directory services.
//!
//! ## Architecture
//!
//! Capabilities are split into traits so each dialect implements exactly the
//! operation set, sharing base behavior through delegation:
//!
//! - [`Backend`](traits::Backend) - name, dialect, connection test
//! - [`AuthenticateOp`](traits::AuthenticateOp) - credential checks
//! - [`UserOp`](traits::UserOp) - create, read, update, delete users
//! - [`GroupOp`](traits::GroupOp) - membership changes and listing
//! - [`SearchOp`](traits::SearchOp) - user search
//!
//! [`DirectoryBackend`](traits::DirectoryBackend) bundles all of them and is
//! what the provisioning layer holds.
//!
//! ## Crate Organization
//!
//! - [`error`] - Error taxonomy (configuration, not-found, connection, ...)
//! - [`operation`] - Attribute sets, values and search filters
//! - [`identity`] - Users and group references
//! - [`config`] - Shared configuration pieces
//! - [`types`] - Backend dialect enum

pub mod config;
pub mod error;
pub mod identity;
pub mod operation;
pub mod traits;
pub mod types;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{BackendConfig, ConnectionSettings, TlsConfig};
    pub use crate::error::{ConnectorError, ConnectorResult, ErrorKind, ProvisioningStep};
    pub use crate::identity::{GroupNamespace, GroupReference, Identity};
    pub use crate::operation::{AttributeSet, AttributeValue, Filter};
    pub use crate::traits::{
        AuthenticateOp, Backend, DirectoryBackend, GroupOp, SearchOp, UserOp,
    };
    pub use crate::types::BackendType;
}

// Re-export async_trait for backend implementors
pub use async_trait::async_trait;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _ty = BackendType::Ad;
        let _attrs = AttributeSet::new().with("cn", "test");
        let _filter = Filter::eq("sAMAccountName", "jdoe");
        let _group = GroupReference::ordinary("developers");
        let _kind = ErrorKind::NotFound;
    }
}
