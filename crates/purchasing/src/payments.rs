//! Payment ledger: what each winning supplier was paid, and from which account.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use procura_core::{DomainError, Money};

use crate::approval::ApprovalStatus;
use crate::ids::{AccountId, QuoteId};
use crate::order::{
    MarkPaid, OrderPaid, ProcurementEvent, ProcurementOrder, RecordPaidAmount,
    SupplierPaymentRecorded,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
        }
    }
}

/// Amount paid to the supplier of one winning quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaidSupplierRecord {
    pub quote_id: QuoteId,
    pub account: AccountId,
    pub amount_paid: Money,
}

/// One record per quote, with per-account totals kept alongside so reporting
/// never has to walk the quote tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentLedger {
    records: BTreeMap<QuoteId, PaidSupplierRecord>,
    totals: BTreeMap<AccountId, Money>,
    status: PaymentStatus,
    paid_on: Option<NaiveDate>,
}

impl PaymentLedger {
    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }

    pub fn paid_on(&self) -> Option<NaiveDate> {
        self.paid_on
    }

    pub fn record(&self, quote_id: QuoteId) -> Option<&PaidSupplierRecord> {
        self.records.get(&quote_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &PaidSupplierRecord> {
        self.records.values()
    }

    pub fn total(&self) -> Money {
        self.totals
            .values()
            .fold(Money::ZERO, |acc, m| acc.saturating_add(*m))
    }

    pub fn totals_by_account(&self) -> &BTreeMap<AccountId, Money> {
        &self.totals
    }

    /// Total as it would be after replacing the record for `record.quote_id`.
    fn total_after(&self, record: &PaidSupplierRecord) -> Option<Money> {
        let previous = self
            .records
            .get(&record.quote_id)
            .map(|r| r.amount_paid)
            .unwrap_or(Money::ZERO);
        self.total()
            .checked_sub(previous)?
            .checked_add(record.amount_paid)
    }

    pub(crate) fn upsert(&mut self, record: PaidSupplierRecord) {
        if let Some(previous) = self.records.remove(&record.quote_id) {
            self.subtract(&previous.account, previous.amount_paid);
        }

        let total = self.totals.entry(record.account.clone()).or_insert(Money::ZERO);
        *total = total.saturating_add(record.amount_paid);
        self.records.insert(record.quote_id, record);
    }

    fn subtract(&mut self, account: &AccountId, amount: Money) {
        if let Some(total) = self.totals.get_mut(account) {
            *total = total.saturating_sub(amount);
            let empty = total.is_zero()
                && !self.records.values().any(|r| &r.account == account);
            if empty {
                self.totals.remove(account);
            }
        }
    }

    pub(crate) fn mark_paid(&mut self, on: NaiveDate) {
        if self.status == PaymentStatus::Pending {
            self.status = PaymentStatus::Paid;
            self.paid_on = Some(on);
        }
    }
}

impl ProcurementOrder {
    pub(crate) fn handle_record_paid_amount(
        &self,
        cmd: &RecordPaidAmount,
    ) -> Result<Vec<ProcurementEvent>, DomainError> {
        if cmd.amount.is_negative() {
            return Err(DomainError::validation("amount must not be negative"));
        }
        let quote = self.require_quote(cmd.quote_id)?;

        if self.approval_status != ApprovalStatus::Approved {
            return Err(DomainError::precondition(
                "payments can only be recorded on an approved order",
            ));
        }
        if self.payments.is_paid() {
            return Err(DomainError::precondition("order is already marked paid"));
        }
        if !quote.approved_by_md {
            return Err(DomainError::precondition(format!(
                "quote {} is not a winning quote",
                cmd.quote_id
            )));
        }
        if !self.accounts.is_eligible(&cmd.account) {
            return Err(DomainError::precondition(format!(
                "account {} is not marked as holding money for this order",
                cmd.account
            )));
        }

        let record = PaidSupplierRecord {
            quote_id: cmd.quote_id,
            account: cmd.account.clone(),
            amount_paid: cmd.amount,
        };
        if self.payments.record(cmd.quote_id) == Some(&record) {
            return Ok(vec![]);
        }
        if self.payments.total_after(&record).is_none() {
            return Err(DomainError::validation("total paid overflows"));
        }

        Ok(vec![ProcurementEvent::SupplierPaymentRecorded(
            SupplierPaymentRecorded {
                order_id: cmd.order_id,
                record,
                actor: cmd.actor.principal_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    pub(crate) fn handle_mark_paid(
        &self,
        cmd: &MarkPaid,
    ) -> Result<Vec<ProcurementEvent>, DomainError> {
        if self.payments.is_paid() {
            return Ok(vec![]);
        }
        if self.approval_status != ApprovalStatus::Approved {
            return Err(DomainError::precondition(
                "only an approved order can be marked paid",
            ));
        }

        let total_paid = self.payments.total();
        if total_paid <= Money::ZERO {
            return Err(DomainError::precondition(
                "no payment has been recorded against this order",
            ));
        }

        Ok(vec![ProcurementEvent::OrderPaid(OrderPaid {
            order_id: cmd.order_id,
            total_paid,
            actor: cmd.actor.principal_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
