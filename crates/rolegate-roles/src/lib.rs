//! # Role Engine
//!
//! Loads the organization's role model from YAML, validates it, and resolves a
//! selection of roles into the attribute values and group memberships to apply
//! on each backend.
//!
//! ```ignore
//! use rolegate_roles::RoleCatalog;
//!
//! let catalog = RoleCatalog::load("/etc/rolegate/roles.yml")?;
//! let delta = catalog.resolve(&["users", "developers"])?;
//! for (backend, changes) in delta.backends() {
//!     println!("{backend}: {:?}", changes.groups);
//! }
//! ```
//!
//! ## Crate Organization
//!
//! - [`definition`] - Role definitions and the roles file format
//! - [`catalog`] - Validating load and catalog queries
//! - [`resolve`] - Selection to per-backend deltas
//! - [`membership`] - Reverse lookup from a user's groups to roles
//! - [`error`] - Error types

pub mod catalog;
pub mod definition;
pub mod error;
pub mod membership;
pub mod resolve;

pub use catalog::RoleCatalog;
pub use definition::{BackendAssignment, RoleDefinition};
pub use error::{RoleError, RoleErrorKind, RoleResult};
pub use membership::RoleMatch;
pub use resolve::{AttributeConflict, AttributeSource, BackendDelta, RoleDelta};
