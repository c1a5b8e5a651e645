use serde_json::Value as JsonValue;

use procura_events::{EventBus, EventEnvelope};

use crate::audit::{AuditSink, TransitionNotice};
use crate::workers::bus_worker::{BusWorker, WorkerHandle};

/// Turns every published procurement event into a [`TransitionNotice`] for the sink.
#[derive(Debug)]
pub struct NotificationWorker;

impl NotificationWorker {
    pub fn spawn<B, S>(bus: &B, sink: S) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JsonValue>>,
        S: AuditSink + 'static,
    {
        BusWorker::spawn("procurement.notifications", bus, move |env: EventEnvelope<JsonValue>| {
            if let Some(notice) = TransitionNotice::from_envelope(&env)? {
                sink.record(notice);
            }
            Ok::<(), serde_json::Error>(())
        })
    }
}
