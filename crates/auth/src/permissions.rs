use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "procurement.orders.approve").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const ORDERS_READ: Permission = Permission(Cow::Borrowed("procurement.orders.read"));
    pub const ORDERS_CREATE: Permission = Permission(Cow::Borrowed("procurement.orders.create"));
    pub const ORDERS_APPROVE: Permission = Permission(Cow::Borrowed("procurement.orders.approve"));
    pub const ORDERS_REJECT: Permission = Permission(Cow::Borrowed("procurement.orders.reject"));
    pub const QUOTES_SELECT: Permission = Permission(Cow::Borrowed("procurement.quotes.select"));
    pub const INVOICES_ATTACH: Permission =
        Permission(Cow::Borrowed("procurement.invoices.attach"));
    pub const ACCOUNTS_MARK_ELIGIBLE: Permission =
        Permission(Cow::Borrowed("procurement.accounts.mark_eligible"));
    pub const PAYMENTS_RECORD: Permission =
        Permission(Cow::Borrowed("procurement.payments.record"));
    pub const PAYMENTS_MARK_PAID: Permission =
        Permission(Cow::Borrowed("procurement.payments.mark_paid"));
    pub const DELIVERY_CONFIRM: Permission =
        Permission(Cow::Borrowed("procurement.delivery.confirm"));

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
