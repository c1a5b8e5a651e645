//! Delivery gate.

use serde::{Deserialize, Serialize};

use procura_core::DomainError;

use crate::approval::ApprovalStatus;
use crate::order::{ConfirmDelivery, DeliveryConfirmed, ProcurementEvent, ProcurementOrder};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
        }
    }
}

impl ProcurementOrder {
    pub(crate) fn handle_confirm_delivery(
        &self,
        cmd: &ConfirmDelivery,
    ) -> Result<Vec<ProcurementEvent>, DomainError> {
        if self.delivery_status == DeliveryStatus::Delivered {
            return Ok(vec![]);
        }
        match self.approval_status {
            ApprovalStatus::Rejected => {
                return Err(DomainError::precondition(
                    "a rejected order can never be delivered",
                ));
            }
            ApprovalStatus::Pending => {
                return Err(DomainError::precondition("order is not approved yet"));
            }
            ApprovalStatus::Approved => {}
        }
        if !self.payments.is_paid() {
            return Err(DomainError::precondition("order is not paid yet"));
        }

        Ok(vec![ProcurementEvent::DeliveryConfirmed(DeliveryConfirmed {
            order_id: cmd.order_id,
            actor: cmd.actor.principal_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
