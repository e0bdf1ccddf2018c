//! # LDAP Backends
//!
//! Generic LDAP and Active Directory backends for rolegate provisioning.
//!
//! ## Features
//!
//! - Directory sessions over LDAPv3 with an explicit
//!   `Unbound -> Bound -> Closed` lifecycle
//! - SSL/TLS, STARTTLS and custom CA certificates
//! - Configurable user layout and group membership model
//! - Active Directory dialect: UPN binds, `unicodePwd`, `userAccountControl`,
//!   built-in group routing
//! - Registry of backends loaded from YAML
//!
//! ## Example
//!
//! ```ignore
//! use rolegate_connector::prelude::*;
//! use rolegate_connector_ldap::{ActiveDirectoryConfig, AdConnector};
//!
//! let config = ActiveDirectoryConfig::new("ad", "ldaps://dc.example.com", "example.com")
//!     .with_login("Administrator", "secret")
//!     .with_attributes(["cn", "sn", "unicodePwd", "sAMAccountName"]);
//!
//! let backend = AdConnector::new(config)?;
//! backend.add_to_groups("jdoe", &["Remote Desktop Users".to_string()]).await?;
//! ```

pub mod ad;
pub mod codec;
pub mod config;
pub mod connector;
pub mod dn;
pub mod registry;
pub mod session;

// Re-exports
pub use ad::AdConnector;
pub use config::{ActiveDirectoryConfig, LdapConfig, MemberValue, MembershipModel};
pub use connector::LdapConnector;
pub use registry::{BackendEntry, BackendRegistry, BackendsConfig};
pub use session::{DirectorySession, LdapSessionFactory, SessionFactory, SessionState};
