//! Wallet rows and the row-level mutations applied to them.
//!
//! A `SpotAccount` is one user's fiat wallet plus their per-coin holdings;
//! a `FuturesAccount` is one user's margin wallet plus their positions.
//! Nothing here locks or persists; the store runs these mutations inside a
//! transaction on a working copy and commits only when they all succeed.

use crate::ledger::{self, MathError};
use crate::position::{FuturesPosition, PositionError};
use crate::types::{PositionId, Price, Quote, Timestamp, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotWallet {
    pub balance: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotAsset {
    pub coin_id: String,
    pub symbol: String,
    pub amount: Decimal,
    pub avg_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuturesWallet {
    pub balance: Quote,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccountError {
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Quote, available: Quote },

    #[error("Insufficient {coin_id}: requested {requested}, held {held}")]
    InsufficientHoldings {
        coin_id: String,
        requested: Decimal,
        held: Decimal,
    },

    #[error("No {0} held")]
    AssetNotFound(String),

    #[error("Position {0} not found")]
    PositionNotFound(PositionId),

    #[error("Position {0} is already closed")]
    PositionClosed(PositionId),

    #[error(transparent)]
    Math(#[from] MathError),
}

impl From<PositionError> for AccountError {
    fn from(err: PositionError) -> Self {
        match err {
            PositionError::AlreadyClosed(id) => AccountError::PositionClosed(id),
            PositionError::Math(e) => AccountError::Math(e),
        }
    }
}

// 10.0: spot side. fiat wallet + unique (user, coin) asset rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotAccount {
    pub owner: UserId,
    pub wallet: SpotWallet,
    pub assets: BTreeMap<String, SpotAsset>,
    pub created_at: Timestamp,
}

impl SpotAccount {
    pub fn new(owner: UserId, created_at: Timestamp) -> Self {
        Self {
            owner,
            wallet: SpotWallet { balance: Quote::zero() },
            assets: BTreeMap::new(),
            created_at,
        }
    }

    pub fn balance(&self) -> Quote {
        self.wallet.balance
    }

    pub fn holding(&self, coin_id: &str) -> Option<&SpotAsset> {
        self.assets.get(coin_id)
    }

    pub fn credit(&mut self, amount: Quote) -> Result<(), AccountError> {
        self.wallet.balance = self.wallet.balance.checked_add(amount)?;
        Ok(())
    }

    pub fn debit(&mut self, amount: Quote) -> Result<(), AccountError> {
        if amount > self.wallet.balance {
            return Err(AccountError::InsufficientBalance {
                requested: amount,
                available: self.wallet.balance,
            });
        }
        self.wallet.balance = self.wallet.balance.checked_sub(amount)?;
        Ok(())
    }

    // 10.1: upsert the coin row and fold the new lot into the running average.
    // `symbol` is only used when the row does not exist yet.
    pub fn acquire(
        &mut self,
        coin_id: &str,
        symbol: &str,
        qty: Decimal,
        cost: Quote,
    ) -> Result<&SpotAsset, AccountError> {
        let (held_amount, held_avg) = self
            .assets
            .get(coin_id)
            .map(|a| (a.amount, a.avg_price))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));

        let (amount, avg_price) = ledger::weighted_average(held_amount, held_avg, qty, cost.value())?;

        let row = self
            .assets
            .entry(coin_id.to_string())
            .or_insert_with(|| SpotAsset {
                coin_id: coin_id.to_string(),
                symbol: symbol.to_string(),
                amount: Decimal::ZERO,
                avg_price: Decimal::ZERO,
            });
        row.amount = amount;
        row.avg_price = avg_price;
        Ok(row)
    }

    // 10.2: take `qty` out of a holding. rows that reach zero are deleted.
    pub fn release(&mut self, coin_id: &str, qty: Decimal) -> Result<Decimal, AccountError> {
        let row = self
            .assets
            .get_mut(coin_id)
            .ok_or_else(|| AccountError::AssetNotFound(coin_id.to_string()))?;

        if qty > row.amount {
            return Err(AccountError::InsufficientHoldings {
                coin_id: coin_id.to_string(),
                requested: qty,
                held: row.amount,
            });
        }

        row.amount -= qty;
        let remaining = row.amount;
        if remaining <= Decimal::ZERO {
            self.assets.remove(coin_id);
        }
        Ok(remaining)
    }
}

// 10.3: futures side. margin wallet + every position the user ever opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuturesAccount {
    pub owner: UserId,
    pub wallet: FuturesWallet,
    pub positions: Vec<FuturesPosition>,
    pub created_at: Timestamp,
}

impl FuturesAccount {
    pub fn new(owner: UserId, starting_balance: Quote, created_at: Timestamp) -> Self {
        Self {
            owner,
            wallet: FuturesWallet { balance: starting_balance },
            positions: Vec::new(),
            created_at,
        }
    }

    pub fn balance(&self) -> Quote {
        self.wallet.balance
    }

    pub fn reserve_margin(&mut self, amount: Quote) -> Result<(), AccountError> {
        if amount > self.wallet.balance {
            return Err(AccountError::InsufficientBalance {
                requested: amount,
                available: self.wallet.balance,
            });
        }
        self.wallet.balance = self.wallet.balance.checked_sub(amount)?;
        Ok(())
    }

    pub fn insert_position(&mut self, position: FuturesPosition) -> &FuturesPosition {
        self.positions.push(position);
        &self.positions[self.positions.len() - 1]
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &FuturesPosition> {
        self.positions.iter().filter(|p| p.is_open())
    }

    pub fn open_position(&self, id: PositionId) -> Option<&FuturesPosition> {
        self.open_positions().find(|p| p.id == id)
    }

    // 10.4: close + settle. the only path besides open that moves the balance.
    pub fn settle_position(
        &mut self,
        id: PositionId,
        exit_price: Price,
        closed_at: Timestamp,
    ) -> Result<&FuturesPosition, AccountError> {
        let idx = self
            .positions
            .iter()
            .position(|p| p.id == id)
            .ok_or(AccountError::PositionNotFound(id))?;

        // a failed credit leaves the position closed on this working copy; the txn discards it
        let credit = self.positions[idx].close(exit_price, closed_at)?;
        self.wallet.balance = self.wallet.balance.checked_add(credit)?;
        Ok(&self.positions[idx])
    }

    pub fn locked_margin(&self) -> Result<Quote, MathError> {
        Quote::checked_sum(self.open_positions().map(|p| p.initial_margin))
    }
}
