use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::permissions_for_roles;
use crate::{Permission, PrincipalId, Role};

/// A fully resolved caller for authorization decisions.
///
/// `permissions` are derived from `roles` through the policy at construction
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        let permissions = permissions_for_roles(&roles);
        Self {
            principal_id,
            roles,
            permissions,
        }
    }

    /// Convenience for a fresh principal holding a single role.
    pub fn with_role(role: Role) -> Self {
        Self::new(PrincipalId::new(), vec![role])
    }

    /// Roles joined with `,` for logs and error messages.
    pub fn role_names(&self) -> String {
        self.roles
            .iter()
            .map(Role::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: roles [{roles}] lack permission '{permission}'")]
    Forbidden { permission: String, roles: String },
}

/// Command-side authorization contract.
///
/// Implemented by commands so that the handler can check capability before
/// looking at any state.
pub trait CommandAuthorization {
    fn required_permission(&self) -> Permission;
}

/// Authorize a principal for one permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.permissions.contains(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            permission: required.as_str().to_string(),
            roles: principal.role_names(),
        })
    }
}
