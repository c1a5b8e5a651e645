use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for RBAC.
///
/// Roles stay opaque strings so that an identity service can hand us names we
/// don't know about; unknown roles simply grant nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// Creates orders, attaches invoices, confirms delivery.
    pub const PROCUREMENT_MANAGER: Role = Role(Cow::Borrowed("procurement_manager"));
    /// Picks winning quotes, approves or rejects orders.
    pub const DIRECTOR: Role = Role(Cow::Borrowed("director"));
    /// Marks funded accounts and records payments.
    pub const ACCOUNTS: Role = Role(Cow::Borrowed("accounts"));
    pub const READ_ONLY: Role = Role(Cow::Borrowed("read_only"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
