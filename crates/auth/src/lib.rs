//! `procura-auth`: pure capability checks for procurement transitions.
//!
//! Authentication is someone else's job: callers arrive here already resolved
//! to a principal id and a set of roles. This crate is decoupled from HTTP and
//! storage.

pub mod authorize;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize};
pub use permissions::Permission;
pub use policy::permissions_for_role;
pub use principal::PrincipalId;
pub use roles::Role;
