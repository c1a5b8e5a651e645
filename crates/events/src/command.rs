use procura_core::AggregateId;

/// A command targets a specific aggregate.
///
/// Commands represent **intent**. They are transient (never persisted) and are
/// turned into events (which are). Each command operates on exactly one
/// aggregate, which is the transaction boundary, so infrastructure routes and
/// serializes on `target_aggregate_id()`.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
