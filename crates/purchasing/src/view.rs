//! Read shape of an order, returned by every operation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use procura_core::{AggregateRoot, Money};

use crate::approval::{ApprovalStatus, unmet_items};
use crate::delivery::DeliveryStatus;
use crate::ids::{AccountId, InventoryRef, InvoiceRef, ItemId, OrderId, QuoteId};
use crate::order::{OrderType, ProcurementOrder};
use crate::payments::{PaidSupplierRecord, PaymentStatus};
use crate::quotes::Quote;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    pub id: ItemId,
    pub item_ref: InventoryRef,
    pub quantity: i64,
    pub reason: Option<String>,
    pub quotes: Vec<Quote>,
    pub winning_quote: Option<QuoteId>,
    pub has_approved_supplier: bool,
}

/// Snapshot of an order with its derived fields filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub id: OrderId,
    pub order_number: String,
    pub order_type: OrderType,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub approval_status: ApprovalStatus,
    pub payment_status: PaymentStatus,
    pub delivery_status: DeliveryStatus,
    pub rejection_reason: Option<String>,
    pub items: Vec<ItemView>,
    pub accounts_with_money: BTreeSet<AccountId>,
    pub approved_account: Option<AccountId>,
    pub paid_suppliers: Vec<PaidSupplierRecord>,
    pub total_paid: Money,
    pub total_paid_per_account: BTreeMap<AccountId, Money>,
    pub can_finalize: bool,
    pub can_deliver: bool,
    pub unmet_items: Vec<ItemId>,
    /// Sum of winning unit price × quantity; `None` until every item has a winner.
    pub committed_cost: Option<Money>,
    pub payment_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub version: u64,
}

/// One quote's invoice, as listed for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceListing {
    pub item_id: ItemId,
    pub item_ref: InventoryRef,
    pub quote_id: QuoteId,
    pub supplier_name: String,
    pub invoice_ref: InvoiceRef,
    pub winning: bool,
}

impl OrderView {
    /// Every attached invoice reference, winners and losers alike.
    pub fn invoices(&self) -> Vec<InvoiceListing> {
        self.items
            .iter()
            .flat_map(|item| {
                item.quotes.iter().filter_map(move |q| {
                    q.invoice_ref.as_ref().map(|r| InvoiceListing {
                        item_id: item.id,
                        item_ref: item.item_ref.clone(),
                        quote_id: q.id,
                        supplier_name: q.supplier_name.clone(),
                        invoice_ref: r.clone(),
                        winning: q.approved_by_md,
                    })
                })
            })
            .collect()
    }
}

impl ProcurementOrder {
    pub fn view(&self) -> OrderView {
        let items = self
            .items
            .iter()
            .map(|i| ItemView {
                id: i.id,
                item_ref: i.item_ref.clone(),
                quantity: i.quantity,
                reason: i.reason.clone(),
                quotes: i.quotes.clone(),
                winning_quote: i.winner().map(|q| q.id),
                has_approved_supplier: i.winner_count() == 1,
            })
            .collect();

        let committed_cost = if self.can_finalize() {
            self.items
                .iter()
                .map(|i| i.committed_cost())
                .try_fold(Money::ZERO, |acc, cost| acc.checked_add(cost?))
        } else {
            None
        };

        OrderView {
            id: self.id,
            order_number: self.order_number.clone(),
            order_type: self.order_type,
            notes: self.notes.clone(),
            created_at: self.created_at,
            approval_status: self.approval_status,
            payment_status: self.payments.status(),
            delivery_status: self.delivery_status,
            rejection_reason: self.rejection_reason.clone(),
            items,
            accounts_with_money: self.accounts.eligible().clone(),
            approved_account: self.accounts.approved().cloned(),
            paid_suppliers: self.payments.records().cloned().collect(),
            total_paid: self.payments.total(),
            total_paid_per_account: self.payments.totals_by_account().clone(),
            can_finalize: self.can_finalize(),
            can_deliver: self.can_deliver(),
            unmet_items: unmet_items(&self.items),
            committed_cost,
            payment_date: self.payments.paid_on(),
            delivery_date: self.delivery_date,
            version: self.version(),
        }
    }
}
