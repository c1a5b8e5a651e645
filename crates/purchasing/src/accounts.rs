//! Disbursement accounts: which funds may pay for an order, and which one did.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use procura_core::DomainError;

use crate::approval::ApprovalStatus;
use crate::ids::AccountId;
use crate::order::{EligibleAccountsSet, ProcurementEvent, ProcurementOrder, SetEligibleAccounts};

/// Accounts marked as holding money for an order, plus the one chosen at
/// final approval. Once `approved` is set it never changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisbursementAccounts {
    eligible: BTreeSet<AccountId>,
    approved: Option<AccountId>,
}

impl DisbursementAccounts {
    pub fn eligible(&self) -> &BTreeSet<AccountId> {
        &self.eligible
    }

    pub fn approved(&self) -> Option<&AccountId> {
        self.approved.as_ref()
    }

    pub fn is_eligible(&self, account: &AccountId) -> bool {
        self.eligible.contains(account)
    }

    pub(crate) fn replace_eligible(&mut self, accounts: BTreeSet<AccountId>) {
        self.eligible = accounts;
    }

    pub(crate) fn approve(&mut self, account: AccountId) {
        if self.approved.is_none() {
            self.approved = Some(account);
        }
    }
}

impl ProcurementOrder {
    pub(crate) fn handle_set_eligible_accounts(
        &self,
        cmd: &SetEligibleAccounts,
    ) -> Result<Vec<ProcurementEvent>, DomainError> {
        if self.approval_status != ApprovalStatus::Pending {
            return Err(DomainError::precondition(
                "eligible accounts can only change while the order is pending",
            ));
        }

        if self.accounts.eligible == cmd.accounts {
            return Ok(vec![]);
        }

        Ok(vec![ProcurementEvent::EligibleAccountsSet(EligibleAccountsSet {
            order_id: cmd.order_id,
            accounts: cmd.accounts.clone(),
            actor: cmd.actor.principal_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(s: &str) -> AccountId {
        AccountId::new(s).unwrap()
    }

    #[test]
    fn approved_account_is_write_once() {
        let mut accounts = DisbursementAccounts::default();
        accounts.approve(acct("petty_cash"));
        accounts.approve(acct("donors_money"));

        assert_eq!(accounts.approved(), Some(&acct("petty_cash")));
    }

    #[test]
    fn replace_swaps_the_whole_set() {
        let mut accounts = DisbursementAccounts::default();
        accounts.replace_eligible([acct("hay_money"), acct("afes")].into_iter().collect());
        accounts.replace_eligible([acct("afes")].into_iter().collect());

        assert!(accounts.is_eligible(&acct("afes")));
        assert!(!accounts.is_eligible(&acct("hay_money")));
    }
}
