//! Winner selection, final approval and rejection.

use serde::{Deserialize, Serialize};

use procura_core::DomainError;

use crate::ids::ItemId;
use crate::order::{
    FinalApprove, OrderApproved, OrderRejected, ProcurementEvent, ProcurementOrder, Reject,
    SelectWinningQuote, WinningQuoteSelected,
};
use crate::quotes::Item;

/// Director's decision on the order as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

/// Items that still lack a winning quote, in item order.
pub fn unmet_items(items: &[Item]) -> Vec<ItemId> {
    items
        .iter()
        .filter(|i| i.winner_count() != 1)
        .map(|i| i.id)
        .collect()
}

/// True iff every item has exactly one winning quote.
pub fn can_finalize(items: &[Item]) -> bool {
    !items.is_empty() && unmet_items(items).is_empty()
}

fn describe_unmet(unmet: &[ItemId]) -> String {
    let ids = unmet
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if unmet.len() == 1 {
        format!("item {ids} has no approved supplier")
    } else {
        format!("items {ids} have no approved supplier")
    }
}

impl ProcurementOrder {
    pub(crate) fn handle_select_winning_quote(
        &self,
        cmd: &SelectWinningQuote,
    ) -> Result<Vec<ProcurementEvent>, DomainError> {
        let item = self
            .item(cmd.item_id)
            .ok_or_else(|| DomainError::validation(format!("unknown item {}", cmd.item_id)))?;
        if item.quote(cmd.quote_id).is_none() {
            return Err(DomainError::validation(format!(
                "quote {} does not belong to item {}",
                cmd.quote_id, cmd.item_id
            )));
        }

        if self.approval_status != ApprovalStatus::Pending {
            return Err(DomainError::precondition(format!(
                "winners can only change while the order is pending (order is {})",
                self.approval_status.as_str()
            )));
        }

        let current = item.winner().map(|q| q.id);
        if current == Some(cmd.quote_id) {
            return Ok(vec![]);
        }

        Ok(vec![ProcurementEvent::WinningQuoteSelected(
            WinningQuoteSelected {
                order_id: cmd.order_id,
                item_id: cmd.item_id,
                quote_id: cmd.quote_id,
                demoted: current,
                actor: cmd.actor.principal_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    pub(crate) fn handle_final_approve(
        &self,
        cmd: &FinalApprove,
    ) -> Result<Vec<ProcurementEvent>, DomainError> {
        match self.approval_status {
            ApprovalStatus::Approved => {
                return if self.accounts.approved() == Some(&cmd.account) {
                    Ok(vec![])
                } else {
                    Err(DomainError::precondition(
                        "order is already approved against another account",
                    ))
                };
            }
            ApprovalStatus::Rejected => {
                return Err(DomainError::precondition("order was rejected"));
            }
            ApprovalStatus::Pending => {}
        }

        let unmet = unmet_items(&self.items);
        if !unmet.is_empty() {
            return Err(DomainError::precondition(describe_unmet(&unmet)));
        }

        if !self.accounts.is_eligible(&cmd.account) {
            return Err(DomainError::precondition(format!(
                "account {} is not marked as holding money for this order",
                cmd.account
            )));
        }

        Ok(vec![ProcurementEvent::OrderApproved(OrderApproved {
            order_id: cmd.order_id,
            approved_account: cmd.account.clone(),
            actor: cmd.actor.principal_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    pub(crate) fn handle_reject(&self, cmd: &Reject) -> Result<Vec<ProcurementEvent>, DomainError> {
        match self.approval_status {
            ApprovalStatus::Rejected => Ok(vec![]),
            ApprovalStatus::Approved => Err(DomainError::precondition(
                "an approved order cannot be rejected",
            )),
            ApprovalStatus::Pending => {
                let reason = cmd
                    .reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string);

                Ok(vec![ProcurementEvent::OrderRejected(OrderRejected {
                    order_id: cmd.order_id,
                    reason,
                    actor: cmd.actor.principal_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
