use procura_auth::{Principal, PrincipalId, Role};

/// Principal context for a request (identity + roles, resolved upstream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        Self { principal_id, roles }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Resolve role grants into a principal the service can authorize.
    pub fn principal(&self) -> Principal {
        Principal::new(self.principal_id, self.roles.clone())
    }
}
