use chrono::{DateTime, Utc};

/// A recorded fact about an aggregate.
///
/// Once appended an event is never edited; corrections are new events.
/// `event_type` plus `version` identify the payload schema in the store.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, e.g. `procurement.order.approved`.
    fn event_type(&self) -> &'static str;

    /// Payload schema version; bumped on incompatible payload changes.
    fn version(&self) -> u32;

    /// Business time of the transition, as supplied by the command.
    fn occurred_at(&self) -> DateTime<Utc>;
}
