//! Active Directory specific modules
//!
//! Extends the base LDAP backend with AD-specific capabilities:
//! - userAccountControl bitfield handling
//! - unicodePwd encoding
//! - Built-in group classification
//! - Create-then-enable provisioning sequence

pub mod builtin;
pub mod connector;
pub mod password;
pub mod user_account_control;

// Re-export key types
pub use builtin::AD_BUILTIN_GROUPS;
pub use connector::AdConnector;
pub use password::{encode_ad_password, AdCodec, UNICODE_PWD};
pub use user_account_control::UserAccountControl;
