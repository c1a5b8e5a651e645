use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use procura_core::Money;
use procura_purchasing::{AccountId, InvoiceListing, InvoiceRef, OrderView, QuoteId};

// -------------------------
// Request DTOs
// -------------------------
//
// Every mutating body may carry the version the caller last saw.

#[derive(Debug, Default, Deserialize)]
pub struct VersionedRequest {
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SelectQuoteRequest {
    pub quote_id: QuoteId,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct EligibleAccountsRequest {
    pub accounts: BTreeSet<AccountId>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub account: AccountId,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub quote_id: QuoteId,
    pub account: AccountId,
    /// Minor units (cents).
    pub amount: Money,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AttachInvoiceRequest {
    pub invoice_ref: InvoiceRef,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

// -------------------------
// Response DTOs
// -------------------------

/// An order plus the invoice references recorded against its quotes.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: OrderView,
    pub invoices: Vec<InvoiceListing>,
}

impl From<OrderView> for OrderResponse {
    fn from(order: OrderView) -> Self {
        let invoices = order.invoices();
        Self { order, invoices }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderList {
    pub items: Vec<OrderView>,
}
