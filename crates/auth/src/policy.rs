//! Role → permission policy for the procurement lifecycle.

use crate::{Permission, Role};

/// Permissions granted by a single role.
///
/// Unknown roles grant nothing. Every known role may read orders.
pub fn permissions_for_role(role: &Role) -> Vec<Permission> {
    match role.as_str() {
        "procurement_manager" => vec![
            Permission::ORDERS_READ,
            Permission::ORDERS_CREATE,
            Permission::INVOICES_ATTACH,
            Permission::DELIVERY_CONFIRM,
        ],
        "director" => vec![
            Permission::ORDERS_READ,
            Permission::QUOTES_SELECT,
            Permission::ORDERS_APPROVE,
            Permission::ORDERS_REJECT,
        ],
        "accounts" => vec![
            Permission::ORDERS_READ,
            Permission::ACCOUNTS_MARK_ELIGIBLE,
            Permission::PAYMENTS_RECORD,
            Permission::PAYMENTS_MARK_PAID,
        ],
        "read_only" => vec![Permission::ORDERS_READ],
        _ => Vec::new(),
    }
}

/// Union of the permissions granted by `roles`, sorted and deduplicated.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut perms: Vec<Permission> = roles.iter().flat_map(permissions_for_role).collect();
    perms.sort();
    perms.dedup();
    perms
}
