use std::sync::Arc;

use serde_json::Value as JsonValue;

use procura_events::{EventEnvelope, InMemoryEventBus};
use procura_infra::{
    ProcurementService,
    audit::TracingAuditSink,
    config::ProcurementConfig,
    event_store::InMemoryEventStore,
    workers::{NotificationWorker, WorkerHandle},
};

pub type ApiBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type OrdersService = ProcurementService<Arc<InMemoryEventStore>, ApiBus>;

/// Everything a handler needs; shared behind an `Arc`.
pub struct AppServices {
    pub orders: OrdersService,
    // Held so the worker lives as long as the router.
    _notifications: WorkerHandle,
}

/// In-memory wiring: store + bus + service, with transition notices logged.
pub fn build_services(config: ProcurementConfig) -> std::io::Result<AppServices> {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: ApiBus = Arc::new(InMemoryEventBus::new());

    // Subscribe before the first command so no transition is missed.
    let notifications = NotificationWorker::spawn(&bus, TracingAuditSink)?;

    Ok(AppServices {
        orders: ProcurementService::new(store, bus, config),
        _notifications: notifications,
    })
}
