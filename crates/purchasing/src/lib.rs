//! Procurement domain module (procurement orders, event-sourced).
//!
//! An order collects competing supplier quotes per line item, gets one winner
//! per item picked by a director, is funded from an account marked by the
//! accounts role, is paid supplier by supplier and is finally confirmed as
//! delivered. All rules live here as deterministic domain logic (no IO, no
//! HTTP, no storage).
//!
//! Layout follows the lifecycle:
//! - [`quotes`]: items and their competing quotes (one winner per item)
//! - [`approval`]: winner selection, final approval, rejection
//! - [`accounts`]: disbursement accounts eligible for / approved on an order
//! - [`payments`]: per-supplier paid amounts and the paid flag
//! - [`delivery`]: the irreversible delivery confirmation
//! - [`order`]: the aggregate, its commands and events
//! - [`view`]: the read shape returned by every operation

pub mod accounts;
pub mod approval;
pub mod delivery;
pub mod ids;
pub mod order;
pub mod payments;
pub mod quotes;
pub mod view;

pub use accounts::DisbursementAccounts;
pub use approval::{ApprovalStatus, can_finalize, unmet_items};
pub use delivery::DeliveryStatus;
pub use ids::{AccountId, InventoryRef, InvoiceRef, ItemId, OrderId, QuoteId};
pub use order::{
    AGGREGATE_TYPE, AttachInvoice, ConfirmDelivery, CreateOrder, DeliveryConfirmed,
    EligibleAccountsSet, FinalApprove, InvoiceAttached, MarkPaid, NewItem, NewQuote,
    OrderApproved, OrderCreated, OrderPaid, OrderRejected, OrderType, ProcurementCommand,
    ProcurementEvent, ProcurementOrder, RecordPaidAmount, Reject, SelectWinningQuote,
    SetEligibleAccounts, SupplierPaymentRecorded, WinningQuoteSelected,
};
pub use payments::{PaidSupplierRecord, PaymentLedger, PaymentStatus};
pub use quotes::{Item, Quote};
pub use view::{InvoiceListing, ItemView, OrderView};
