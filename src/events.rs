// 11.0: every committed ledger mutation produces an event. used for audit trails and
// for checking conservation after the fact. the EventPayload enum lists all event types.

use crate::types::{Leverage, PositionId, Price, Quote, Side, Timestamp, UserId};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub user: UserId,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Provisioning
    WalletProvisioned(WalletProvisionedEvent),

    // Spot
    Deposit(BalanceMoveEvent),
    Withdrawal(BalanceMoveEvent),
    SpotBuy(SpotTradeEvent),
    SpotSell(SpotTradeEvent),
    SpotConvert(SpotConvertEvent),

    // Futures
    PositionOpened(PositionOpenedEvent),
    PositionClosed(PositionClosedEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    Spot,
    Futures,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletProvisionedEvent {
    pub wallet: WalletKind,
    pub starting_balance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceMoveEvent {
    pub amount: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotTradeEvent {
    pub coin_id: String,
    pub quantity: Decimal,
    pub price: Price,
    pub usd_value: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotConvertEvent {
    pub from_coin: String,
    pub to_coin: String,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub usd_value: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub position_id: PositionId,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Price,
    pub contracts: Decimal,
    pub leverage: Leverage,
    pub margin: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub position_id: PositionId,
    pub exit_price: Price,
    pub realized_pnl: Quote,
    pub margin_returned: Quote,
    pub new_balance: Quote,
}

#[derive(Debug)]
struct JournalState {
    events: VecDeque<Event>,
    next_id: u64,
}

/// Bounded in-memory journal. Oldest events are dropped past `max_events`.
#[derive(Debug)]
pub struct Journal {
    state: Mutex<JournalState>,
    max_events: usize,
}

impl Journal {
    pub fn new(max_events: usize) -> Self {
        Self {
            state: Mutex::new(JournalState {
                events: VecDeque::new(),
                next_id: 1,
            }),
            max_events,
        }
    }

    pub fn record(&self, user: UserId, payload: EventPayload) -> EventId {
        let mut state = self.state.lock();
        let id = EventId(state.next_id);
        state.next_id += 1;
        state.events.push_back(Event {
            id,
            timestamp: Timestamp::now(),
            user,
            payload,
        });
        while state.events.len() > self.max_events {
            state.events.pop_front();
        }
        id
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn for_user(&self, user: UserId) -> Vec<Event> {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| e.user == user)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn deposit(amount: Decimal) -> EventPayload {
        EventPayload::Deposit(BalanceMoveEvent {
            amount: Quote::new(amount),
            new_balance: Quote::new(amount),
        })
    }

    #[test]
    fn ids_increase() {
        let journal = Journal::new(10);
        let a = journal.record(UserId(1), deposit(dec!(1)));
        let b = journal.record(UserId(1), deposit(dec!(2)));
        assert!(b > a);
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn bounded_drops_oldest() {
        let journal = Journal::new(3);
        for i in 0..5 {
            journal.record(UserId(1), deposit(Decimal::from(i)));
        }
        let events = journal.for_user(UserId(1));
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].id, EventId(3));
        assert_eq!(events[2].id, EventId(5));
    }

    #[test]
    fn filter_by_user() {
        let journal = Journal::new(10);
        journal.record(UserId(1), deposit(dec!(1)));
        journal.record(UserId(2), deposit(dec!(2)));
        journal.record(UserId(1), deposit(dec!(3)));
        assert_eq!(journal.for_user(UserId(1)).len(), 2);
        assert_eq!(journal.for_user(UserId(3)).len(), 0);
    }
}
