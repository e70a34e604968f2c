// 8.0 engine/core.rs: main engine. owns the wallet store, the shared price
// service and the audit journal. every method takes &self; row locks in the
// store serialize writers per user.

use crate::config::{ConfigError, LedgerConfig};
use crate::events::{Event, EventId, EventPayload, Journal};
use crate::price_feed::{PriceOracle, PriceService};
use crate::store::LedgerStore;
use crate::types::{Quote, UserId};
use std::sync::Arc;
use tracing::info;

/** 8.1: main engine struct. all state lives here */
pub struct Engine {
    pub(super) config: LedgerConfig,
    pub(super) store: LedgerStore,
    pub(super) prices: PriceService,
    pub(super) journal: Journal,
}

impl Engine {
    pub fn new(config: LedgerConfig, oracle: Arc<dyn PriceOracle>) -> Result<Self, ConfigError> {
        config.validate()?;
        let prices = PriceService::new(oracle, &config.oracle);
        info!(
            environment = ?config.environment,
            oracle = prices.name(),
            starting_balance = %config.futures.starting_balance,
            max_leverage = config.futures.max_leverage,
            "ledger engine ready"
        );
        Ok(Self {
            journal: Journal::new(config.journal_max_events),
            store: LedgerStore::new(),
            prices,
            config,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn prices(&self) -> &PriceService {
        &self.prices
    }

    pub fn spot_wallet_count(&self) -> usize {
        self.store.spot_wallet_count()
    }

    pub fn futures_wallet_count(&self) -> usize {
        self.store.futures_wallet_count()
    }

    pub(super) fn starting_balance(&self) -> Quote {
        Quote::new(self.config.futures.starting_balance)
    }

    pub fn events_for(&self, user: UserId) -> Vec<Event> {
        self.journal.for_user(user)
    }

    pub fn event_count(&self) -> usize {
        self.journal.len()
    }

    pub(super) fn emit_event(&self, user: UserId, payload: EventPayload) -> EventId {
        self.journal.record(user, payload)
    }
}
