//! Transition notices for the audit/notification collaborator.
//!
//! Every committed procurement event becomes one [`TransitionNotice`]. Sinks
//! only record or forward notices; actually notifying people happens outside
//! this workspace.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

use procura_auth::{PrincipalId, Role};
use procura_events::EventEnvelope;
use procura_purchasing::{AGGREGATE_TYPE, OrderId, ProcurementEvent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionNotice {
    pub order_id: OrderId,
    /// Only known on the creation notice.
    pub order_number: Option<String>,
    pub transition: String,
    pub actor: PrincipalId,
    pub occurred_at: DateTime<Utc>,
    pub sequence_number: u64,
}

impl TransitionNotice {
    pub fn from_event(event: &ProcurementEvent, sequence_number: u64) -> Self {
        let order_number = match event {
            ProcurementEvent::OrderCreated(e) => Some(e.order_number.clone()),
            _ => None,
        };

        Self {
            order_id: event.order_id(),
            order_number,
            transition: event.transition_name().to_string(),
            actor: event.actor(),
            occurred_at: procura_events::Event::occurred_at(event),
            sequence_number,
        }
    }

    /// Decode a published envelope. Envelopes of other aggregates yield `None`.
    pub fn from_envelope(
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<Option<Self>, serde_json::Error> {
        if !envelope.is_for(AGGREGATE_TYPE) {
            return Ok(None);
        }
        let event: ProcurementEvent = envelope.decode()?;
        Ok(Some(Self::from_event(&event, envelope.sequence_number())))
    }

    /// Roles to be told about this transition.
    pub fn audience(&self) -> Vec<Role> {
        match self.transition.as_str() {
            "delivered" => vec![Role::DIRECTOR, Role::PROCUREMENT_MANAGER, Role::ACCOUNTS],
            _ => vec![],
        }
    }
}

/// Receiver of transition notices.
pub trait AuditSink: Send + Sync {
    fn record(&self, notice: TransitionNotice);
}

impl<S> AuditSink for std::sync::Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn record(&self, notice: TransitionNotice) {
        (**self).record(notice)
    }
}

/// Keeps every notice in memory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    notices: Mutex<Vec<TransitionNotice>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<TransitionNotice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn for_order(&self, order_id: OrderId) -> Vec<TransitionNotice> {
        self.notices()
            .into_iter()
            .filter(|n| n.order_id == order_id)
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, notice: TransitionNotice) {
        if let Ok(mut notices) = self.notices.lock() {
            // At-least-once delivery: drop replays of a notice already held.
            let seen = notices
                .iter()
                .any(|n| n.order_id == notice.order_id && n.sequence_number == notice.sequence_number);
            if !seen {
                notices.push(notice);
            }
        }
    }
}

/// Writes each notice as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, notice: TransitionNotice) {
        let audience = notice
            .audience()
            .iter()
            .map(Role::as_str)
            .collect::<Vec<_>>()
            .join(",");
        info!(
            order_id = %notice.order_id,
            order_number = notice.order_number.as_deref().unwrap_or(""),
            transition = %notice.transition,
            actor = %notice.actor,
            occurred_at = %notice.occurred_at,
            audience = %audience,
            "procurement transition"
        );
    }
}
