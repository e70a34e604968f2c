// 4.0: futures position row. created OPEN, closed exactly once, immutable after.
// contracts and liquidation price are derived at open; pnl is fixed at close.

use crate::ledger::{self, MathError};
use crate::types::{Leverage, PositionId, PositionStatus, Price, Quote, Side, Timestamp, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuturesPosition {
    pub id: PositionId,
    pub owner: UserId,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Price,
    pub amount: Decimal,
    pub leverage: Leverage,
    pub initial_margin: Quote,
    pub liquidation_price: Decimal,
    pub status: PositionStatus,
    pub opened_at: Timestamp,
    pub closed_at: Option<Timestamp>,
    pub pnl: Quote,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("position {0} is already closed")]
    AlreadyClosed(PositionId),

    #[error(transparent)]
    Math(#[from] MathError),
}

impl FuturesPosition {
    // 4.1: sizes the position from margin and leverage. symbol is upper-cased
    // so it matches the keys used for price lookups.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: PositionId,
        owner: UserId,
        symbol: &str,
        side: Side,
        entry_price: Price,
        margin: Quote,
        leverage: Leverage,
        opened_at: Timestamp,
    ) -> Result<Self, MathError> {
        let amount = ledger::contracts(margin.value(), entry_price.value(), leverage)?;
        let liquidation_price = ledger::liquidation_price(entry_price.value(), leverage, side)?;

        Ok(Self {
            id,
            owner,
            symbol: symbol.trim().to_uppercase(),
            side,
            entry_price,
            amount,
            leverage,
            initial_margin: margin,
            liquidation_price,
            status: PositionStatus::Open,
            opened_at,
            closed_at: None,
            pnl: Quote::zero(),
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    // 4.2: OPEN -> CLOSED. returns the amount to credit back: margin + pnl.
    pub fn close(&mut self, exit_price: Price, closed_at: Timestamp) -> Result<Quote, PositionError> {
        if !self.is_open() {
            return Err(PositionError::AlreadyClosed(self.id));
        }
        let pnl = ledger::realized_pnl(
            self.entry_price.value(),
            exit_price.value(),
            self.side,
            self.amount,
        )?;
        let pnl = Quote::new(pnl);
        let credit = self.initial_margin.checked_add(pnl)?;

        self.status = PositionStatus::Closed;
        self.closed_at = Some(closed_at);
        self.pnl = pnl;

        Ok(credit)
    }
}
