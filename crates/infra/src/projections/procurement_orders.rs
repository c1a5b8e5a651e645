use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use procura_core::{Aggregate, AggregateId, Money};
use procura_events::EventEnvelope;
use procura_purchasing::{
    AGGREGATE_TYPE, AccountId, OrderId, OrderView, ProcurementEvent, ProcurementOrder,
};

use crate::read_model::{ReadModelError, ReadModelStore};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcurementProjectionError {
    #[error("failed to deserialize procurement event: {0}")]
    Deserialize(String),
    #[error("stream mismatch: {0}")]
    StreamMismatch(String),
    #[error("gap in stream {aggregate_id} (last={last}, found={found})")]
    Gap {
        aggregate_id: AggregateId,
        last: u64,
        found: u64,
    },
    #[error(transparent)]
    ReadModel(#[from] ReadModelError),
}

/// Paid amounts summed per disbursement account across all orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisbursementTotals {
    pub per_account: BTreeMap<AccountId, Money>,
    pub total: Money,
    /// Orders with at least one payment record.
    pub orders_with_payments: usize,
}

/// Listing read model: one folded order per id.
///
/// Each event is applied to a read-side copy of the aggregate, so the view
/// served here is computed by the same code as the write side.
#[derive(Debug)]
pub struct ProcurementOrdersProjection<S>
where
    S: ReadModelStore<OrderId, ProcurementOrder>,
{
    store: S,
    /// Last applied sequence number per stream. Held for the whole apply so
    /// that concurrent feeders cannot interleave on one order.
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> ProcurementOrdersProjection<S>
where
    S: ReadModelStore<OrderId, ProcurementOrder>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, order_id: &OrderId) -> Result<Option<OrderView>, ProcurementProjectionError> {
        Ok(self.store.get(order_id)?.map(|o| o.view()))
    }

    /// All orders, oldest first.
    pub fn list(&self) -> Result<Vec<OrderView>, ProcurementProjectionError> {
        let mut views: Vec<OrderView> = self.store.list()?.iter().map(|o| o.view()).collect();
        views.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.order_number.cmp(&b.order_number))
        });
        Ok(views)
    }

    pub fn totals_by_account(&self) -> Result<DisbursementTotals, ProcurementProjectionError> {
        let mut totals = DisbursementTotals::default();
        for order in self.store.list()? {
            let ledger = order.payments();
            if ledger.records().next().is_some() {
                totals.orders_with_payments += 1;
            }
            for (account, amount) in ledger.totals_by_account() {
                let entry = totals
                    .per_account
                    .entry(account.clone())
                    .or_insert(Money::ZERO);
                *entry = entry.saturating_add(*amount);
                totals.total = totals.total.saturating_add(*amount);
            }
        }
        Ok(totals)
    }

    pub fn cursor(&self, aggregate_id: AggregateId) -> Result<u64, ProcurementProjectionError> {
        let cursors = self.cursors.read().map_err(|_| ReadModelError::Poisoned)?;
        Ok(cursors.get(&aggregate_id).copied().unwrap_or(0))
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProcurementProjectionError> {
        if !envelope.is_for(AGGREGATE_TYPE) {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut cursors = self.cursors.write().map_err(|_| ReadModelError::Poisoned)?;
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);

        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(ProcurementProjectionError::Gap {
                aggregate_id,
                last,
                found: seq,
            });
        }

        let ev: ProcurementEvent = envelope
            .decode()
            .map_err(|e| ProcurementProjectionError::Deserialize(e.to_string()))?;

        let order_id = ev.order_id();
        if order_id.0 != aggregate_id {
            return Err(ProcurementProjectionError::StreamMismatch(
                "event order_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let mut order = self
            .store
            .get(&order_id)?
            .unwrap_or_else(|| ProcurementOrder::empty(order_id));
        order.apply(&ev);
        self.store.upsert(order_id, order)?;

        cursors.insert(aggregate_id, seq);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProcurementProjectionError> {
        self.store.clear()?;
        self.cursors
            .write()
            .map_err(|_| ReadModelError::Poisoned)?
            .clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use procura_auth::{Principal, Role};
    use procura_events::execute;
    use procura_purchasing::{
        CreateOrder, InventoryRef, ItemId, NewItem, NewQuote, OrderType, ProcurementCommand,
        QuoteId, SelectWinningQuote,
    };
    use proptest::prelude::*;

    use super::*;
    use crate::read_model::InMemoryReadModelStore;

    type Store = Arc<InMemoryReadModelStore<OrderId, ProcurementOrder>>;

    fn projection() -> ProcurementOrdersProjection<Store> {
        ProcurementOrdersProjection::new(Arc::new(InMemoryReadModelStore::new()))
    }

    fn created_envelope(order_id: OrderId, number: &str) -> EventEnvelope<JsonValue> {
        let mut order = ProcurementOrder::empty(order_id);
        let events = execute(
            &mut order,
            &ProcurementCommand::CreateOrder(CreateOrder {
                order_id,
                order_number: number.to_string(),
                order_type: OrderType::Restock,
                notes: None,
                items: vec![NewItem {
                    item_ref: InventoryRef::new("hay-bale").unwrap(),
                    quantity: 1,
                    reason: None,
                    quotes: vec![NewQuote {
                        supplier_name: "Acme Feed".to_string(),
                        amount_per_unit: Money::from_minor(100),
                        invoice_ref: None,
                    }],
                }],
                actor: Principal::with_role(Role::PROCUREMENT_MANAGER),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        EventEnvelope::new(
            Uuid::now_v7(),
            order_id.0,
            AGGREGATE_TYPE,
            1,
            "procurement.order.created",
            serde_json::to_value(&events[0]).unwrap(),
        )
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let p = projection();
        let order_id = OrderId::generate();
        let env = created_envelope(order_id, "PO1");

        p.apply_envelope(&env).unwrap();
        p.apply_envelope(&env).unwrap();

        let view = p.get(&order_id).unwrap().unwrap();
        assert_eq!(view.order_number, "PO1");
        assert_eq!(view.version, 1);
        assert_eq!(p.cursor(order_id.0).unwrap(), 1);
    }

    #[test]
    fn gaps_are_reported() {
        let p = projection();
        let order_id = OrderId::generate();
        let env = created_envelope(order_id, "PO1");
        let skipped = EventEnvelope::new(
            Uuid::now_v7(),
            order_id.0,
            AGGREGATE_TYPE,
            3,
            env.event_type(),
            env.payload().clone(),
        );

        let err = p.apply_envelope(&skipped).unwrap_err();
        assert_eq!(
            err,
            ProcurementProjectionError::Gap {
                aggregate_id: order_id.0,
                last: 0,
                found: 3
            }
        );
    }

    #[test]
    fn other_aggregate_types_are_ignored() {
        let p = projection();
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            AggregateId::new(),
            "something.else",
            1,
            "something.else.happened",
            serde_json::json!({}),
        );

        p.apply_envelope(&env).unwrap();
        assert!(p.list().unwrap().is_empty());
    }

    #[test]
    fn rebuild_replaces_previous_state() {
        let p = projection();
        let a = OrderId::generate();
        let b = OrderId::generate();
        p.apply_envelope(&created_envelope(a, "PO1")).unwrap();

        p.rebuild_from_scratch(vec![created_envelope(b, "PO2")]).unwrap();

        assert!(p.get(&a).unwrap().is_none());
        assert_eq!(p.list().unwrap().len(), 1);
        assert_eq!(p.totals_by_account().unwrap(), DisbursementTotals::default());
    }

    #[test]
    fn poisoned_cursors_surface_as_errors() {
        let p = Arc::new(projection());
        let poisoner = p.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.cursors.write().unwrap();
            panic!("feeder died holding the cursor lock");
        })
        .join();

        let order_id = OrderId::generate();
        let err = p.apply_envelope(&created_envelope(order_id, "PO1")).unwrap_err();
        assert_eq!(err, ProcurementProjectionError::ReadModel(ReadModelError::Poisoned));
        assert!(p.cursor(order_id.0).is_err());
        assert!(p.get(&order_id).unwrap().is_none());
    }

    /// Stream of one three-quote order followed by the given selections.
    fn selection_stream(picks: &[u32]) -> (ProcurementOrder, Vec<EventEnvelope<JsonValue>>) {
        let order_id = OrderId::generate();
        let mut order = ProcurementOrder::empty(order_id);
        let mut events = execute(
            &mut order,
            &ProcurementCommand::CreateOrder(CreateOrder {
                order_id,
                order_number: "PO9".to_string(),
                order_type: OrderType::Accumulate,
                notes: None,
                items: vec![NewItem {
                    item_ref: InventoryRef::new("salt-lick").unwrap(),
                    quantity: 3,
                    reason: None,
                    quotes: (1..=3)
                        .map(|n| NewQuote {
                            supplier_name: format!("Supplier {n}"),
                            amount_per_unit: Money::from_minor(100 * n as i64),
                            invoice_ref: None,
                        })
                        .collect(),
                }],
                actor: Principal::with_role(Role::PROCUREMENT_MANAGER),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let director = Principal::with_role(Role::DIRECTOR);
        for &pick in picks {
            let cmd = ProcurementCommand::SelectWinningQuote(SelectWinningQuote {
                order_id,
                item_id: ItemId(1),
                quote_id: QuoteId(pick),
                actor: director.clone(),
                occurred_at: Utc::now(),
            });
            events.extend(execute(&mut order, &cmd).unwrap());
        }

        let envelopes = events
            .iter()
            .enumerate()
            .map(|(i, ev)| {
                EventEnvelope::new(
                    Uuid::now_v7(),
                    order_id.0,
                    AGGREGATE_TYPE,
                    i as u64 + 1,
                    procura_events::Event::event_type(ev),
                    serde_json::to_value(ev).unwrap(),
                )
            })
            .collect();
        (order, envelopes)
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn redelivery_converges_on_the_aggregate(
            picks in prop::collection::vec(1u32..=3, 0..12),
            repeats in prop::collection::vec(1usize..=3, 13),
        ) {
            let (order, envelopes) = selection_stream(&picks);
            let p = projection();

            for (env, times) in envelopes.iter().zip(repeats.iter().cycle()) {
                for _ in 0..*times {
                    p.apply_envelope(env).unwrap();
                }
            }

            prop_assert_eq!(p.get(&order.id_typed()).unwrap(), Some(order.view()));
        }
    }
}
