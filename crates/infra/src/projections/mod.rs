//! Projection implementations (read model builders).
//!
//! Projections consume committed events and build query-optimized read models.
//! They are rebuildable from the store and idempotent under at-least-once
//! delivery (per-stream cursors skip anything already applied).

pub mod procurement_orders;

pub use procurement_orders::{
    DisbursementTotals, ProcurementOrdersProjection, ProcurementProjectionError,
};
