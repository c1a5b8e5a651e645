//! Transport-independent procurement operations.
//!
//! Each mutating operation takes the resolved caller first, builds the
//! aggregate command, and runs it through the [`CommandDispatcher`]. The
//! returned [`OrderView`] reflects the order right after the command,
//! whether it changed anything or was an idempotent repeat.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use procura_auth::{CommandAuthorization, Permission, Principal, authorize};
use procura_core::{AggregateRoot, ExpectedVersion, Money};
use procura_events::{EventBus, EventEnvelope};
use procura_purchasing::{
    AGGREGATE_TYPE, AccountId, AttachInvoice, ConfirmDelivery, CreateOrder, FinalApprove,
    InvoiceRef, ItemId, MarkPaid, NewItem, OrderId, OrderType, OrderView, ProcurementCommand,
    ProcurementOrder, QuoteId, RecordPaidAmount, Reject, SelectWinningQuote, SetEligibleAccounts,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::ProcurementConfig;
use crate::event_store::{EventStore, StoredEvent};
use crate::projections::{DisbursementTotals, ProcurementOrdersProjection, ProcurementProjectionError};
use crate::read_model::InMemoryReadModelStore;

pub type OrdersReadModel = Arc<InMemoryReadModelStore<OrderId, ProcurementOrder>>;

impl From<ProcurementProjectionError> for DispatchError {
    fn from(value: ProcurementProjectionError) -> Self {
        match value {
            ProcurementProjectionError::Deserialize(msg) => DispatchError::Deserialize(msg),
            other => DispatchError::ReadModel(other.to_string()),
        }
    }
}

/// Payload of `create_order`; ids and the order number are assigned here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_type: OrderType,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<NewItem>,
}

#[derive(Debug)]
pub struct ProcurementService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    orders: ProcurementOrdersProjection<OrdersReadModel>,
    config: ProcurementConfig,
    next_order_number: AtomicU64,
}

impl<S, B> ProcurementService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, config: ProcurementConfig) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            orders: ProcurementOrdersProjection::new(Arc::new(InMemoryReadModelStore::new())),
            config,
            next_order_number: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ProcurementConfig {
        &self.config
    }

    pub fn bus(&self) -> &B {
        self.dispatcher.bus()
    }

    pub fn create_order(&self, actor: &Principal, order: NewOrder) -> Result<OrderView, DispatchError> {
        // Authorize before consuming an order number.
        self.authorize(actor, &Permission::ORDERS_CREATE)?;

        let seq = self.next_order_number.fetch_add(1, Ordering::SeqCst);
        let order_id = OrderId::generate();
        let cmd = ProcurementCommand::CreateOrder(CreateOrder {
            order_id,
            order_number: format!("{}{seq}", self.config.order_prefix),
            order_type: order.order_type,
            notes: order.notes,
            items: order.items,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.run(cmd, None)
    }

    pub fn select_winning_quote(
        &self,
        actor: &Principal,
        order_id: OrderId,
        item_id: ItemId,
        quote_id: QuoteId,
        expected_version: Option<u64>,
    ) -> Result<OrderView, DispatchError> {
        let cmd = ProcurementCommand::SelectWinningQuote(SelectWinningQuote {
            order_id,
            item_id,
            quote_id,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.run(cmd, expected_version)
    }

    pub fn set_eligible_accounts(
        &self,
        actor: &Principal,
        order_id: OrderId,
        accounts: BTreeSet<AccountId>,
        expected_version: Option<u64>,
    ) -> Result<OrderView, DispatchError> {
        let cmd = ProcurementCommand::SetEligibleAccounts(SetEligibleAccounts {
            order_id,
            accounts,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.run(cmd, expected_version)
    }

    pub fn final_approve(
        &self,
        actor: &Principal,
        order_id: OrderId,
        account: AccountId,
        expected_version: Option<u64>,
    ) -> Result<OrderView, DispatchError> {
        let cmd = ProcurementCommand::FinalApprove(FinalApprove {
            order_id,
            account,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.run(cmd, expected_version)
    }

    pub fn reject(
        &self,
        actor: &Principal,
        order_id: OrderId,
        reason: Option<String>,
        expected_version: Option<u64>,
    ) -> Result<OrderView, DispatchError> {
        let cmd = ProcurementCommand::Reject(Reject {
            order_id,
            reason,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.run(cmd, expected_version)
    }

    pub fn record_paid_amount(
        &self,
        actor: &Principal,
        order_id: OrderId,
        quote_id: QuoteId,
        account: AccountId,
        amount: Money,
        expected_version: Option<u64>,
    ) -> Result<OrderView, DispatchError> {
        let cmd = ProcurementCommand::RecordPaidAmount(RecordPaidAmount {
            order_id,
            quote_id,
            account,
            amount,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.run(cmd, expected_version)
    }

    pub fn mark_paid(
        &self,
        actor: &Principal,
        order_id: OrderId,
        expected_version: Option<u64>,
    ) -> Result<OrderView, DispatchError> {
        let cmd = ProcurementCommand::MarkPaid(MarkPaid {
            order_id,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.run(cmd, expected_version)
    }

    pub fn confirm_delivery(
        &self,
        actor: &Principal,
        order_id: OrderId,
        expected_version: Option<u64>,
    ) -> Result<OrderView, DispatchError> {
        let cmd = ProcurementCommand::ConfirmDelivery(ConfirmDelivery {
            order_id,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.run(cmd, expected_version)
    }

    pub fn attach_invoice(
        &self,
        actor: &Principal,
        order_id: OrderId,
        quote_id: QuoteId,
        invoice_ref: InvoiceRef,
        expected_version: Option<u64>,
    ) -> Result<OrderView, DispatchError> {
        let cmd = ProcurementCommand::AttachInvoice(AttachInvoice {
            order_id,
            quote_id,
            invoice_ref,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.run(cmd, expected_version)
    }

    /// Authoritative read: rehydrated from the store, never stale.
    pub fn get_order(&self, actor: &Principal, order_id: OrderId) -> Result<OrderView, DispatchError> {
        self.authorize(actor, &Permission::ORDERS_READ)?;

        let order = self.dispatcher.load(order_id.0, |id| ProcurementOrder::empty(OrderId::new(id)))?;
        if !order.exists() {
            return Err(DispatchError::NotFound);
        }
        Ok(order.view())
    }

    pub fn list_orders(&self, actor: &Principal) -> Result<Vec<OrderView>, DispatchError> {
        self.authorize(actor, &Permission::ORDERS_READ)?;
        Ok(self.orders.list()?)
    }

    pub fn totals_by_account(&self, actor: &Principal) -> Result<DisbursementTotals, DispatchError> {
        self.authorize(actor, &Permission::ORDERS_READ)?;
        Ok(self.orders.totals_by_account()?)
    }

    /// Rebuild the listing read model from the store and resume numbering
    /// after the highest order seen.
    pub fn rebuild_read_models(&self) -> Result<(), DispatchError> {
        let stored = self.dispatcher.store().load_all(AGGREGATE_TYPE)?;
        self.orders
            .rebuild_from_scratch(stored.iter().map(StoredEvent::to_envelope))?;

        let orders = self.orders.list()?;
        let prefix = &self.config.order_prefix;
        let highest = orders
            .iter()
            .filter_map(|o| o.order_number.strip_prefix(prefix.as_str()))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        self.next_order_number.fetch_max(highest + 1, Ordering::SeqCst);

        info!(orders = orders.len(), "procurement read models rebuilt");
        Ok(())
    }

    fn authorize(&self, actor: &Principal, permission: &Permission) -> Result<(), DispatchError> {
        authorize(actor, permission).map_err(|e| DispatchError::Unauthorized(e.to_string()))
    }

    /// Accounts named by a command must come from the configured catalog.
    fn ensure_known_accounts(&self, cmd: &ProcurementCommand) -> Result<(), DispatchError> {
        let named: Vec<&AccountId> = match cmd {
            ProcurementCommand::SetEligibleAccounts(c) => c.accounts.iter().collect(),
            ProcurementCommand::FinalApprove(c) => vec![&c.account],
            ProcurementCommand::RecordPaidAmount(c) => vec![&c.account],
            _ => vec![],
        };

        match named.into_iter().find(|a| !self.config.accounts.contains(*a)) {
            Some(unknown) => Err(DispatchError::Validation(format!(
                "unknown disbursement account '{unknown}'"
            ))),
            None => Ok(()),
        }
    }

    fn run(
        &self,
        cmd: ProcurementCommand,
        expected_version: Option<u64>,
    ) -> Result<OrderView, DispatchError> {
        let order_id = cmd.order_id();
        let transition = cmd.name();
        let actor = cmd.actor().principal_id;

        let result = self
            .authorize(cmd.actor(), &cmd.required_permission())
            .and_then(|_| self.ensure_known_accounts(&cmd))
            .and_then(|_| {
                self.dispatcher.dispatch(
                    order_id.0,
                    AGGREGATE_TYPE,
                    &cmd,
                    ExpectedVersion::from(expected_version),
                    |id| ProcurementOrder::empty(OrderId::new(id)),
                )
            });

        let dispatched = match result {
            Ok(d) => d,
            Err(err) => {
                warn!(%order_id, transition, %actor, error = %err, "procurement command rejected");
                return Err(err);
            }
        };

        let version = dispatched.aggregate.version();
        if dispatched.committed.is_empty() {
            debug!(%order_id, transition, %actor, version, "procurement command was a no-op");
        } else {
            self.sync_read_model(order_id, &dispatched.committed);
            info!(%order_id, transition, %actor, version, "procurement transition committed");
        }

        Ok(dispatched.aggregate.view())
    }

    /// Feed committed events to the listing projection. A concurrent writer
    /// on the same order can leave a gap; the stream is then replayed from
    /// the store, which the cursor makes idempotent.
    fn sync_read_model(&self, order_id: OrderId, committed: &[StoredEvent]) {
        for stored in committed {
            match self.orders.apply_envelope(&stored.to_envelope()) {
                Ok(()) => {}
                Err(ProcurementProjectionError::Gap { .. }) => {
                    self.catch_up(order_id);
                    return;
                }
                Err(err) => {
                    warn!(%order_id, error = %err, "procurement projection update failed");
                    return;
                }
            }
        }
    }

    fn catch_up(&self, order_id: OrderId) {
        let stream = match self.dispatcher.store().load_stream(order_id.0) {
            Ok(s) => s,
            Err(err) => {
                warn!(%order_id, error = %err, "procurement projection catch-up failed");
                return;
            }
        };
        for stored in &stream {
            if let Err(err) = self.orders.apply_envelope(&stored.to_envelope()) {
                warn!(%order_id, error = %err, "procurement projection catch-up failed");
                return;
            }
        }
    }
}
