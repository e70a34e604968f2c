//! Ledger primitives: position sizing, liquidation price, realized PnL and
//! the cost-weighted average used by spot holdings.
//!
//! All math runs on `Decimal`, never floats. Results are rounded with
//! banker's rounding (round-half-even) at a fixed scale so that repeated
//! runs produce identical ledgers:
//!
//! - money and prices (`MONEY_SCALE`): 8 decimal places
//! - quantities produced by division (`QUANTITY_SCALE`): 18 decimal places
//!
//! Quantities keep the wider scale so that `contracts * price_move` lands on
//! the exact cent figure once the product is rounded back to money scale.

use crate::types::{Leverage, Side};
use rust_decimal::{Decimal, RoundingStrategy};

pub const MONEY_SCALE: u32 = 8;
pub const QUANTITY_SCALE: u32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("division by zero in {0}")]
    DivisionByZero(&'static str),

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointNearestEven)
}

pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(QUANTITY_SCALE, RoundingStrategy::MidpointNearestEven)
}

// 3.1: contracts = margin * leverage / entry
pub fn contracts(margin: Decimal, entry_price: Decimal, leverage: Leverage) -> Result<Decimal, MathError> {
    if entry_price <= Decimal::ZERO {
        return Err(MathError::NonPositivePrice(entry_price));
    }
    let notional = margin
        .checked_mul(leverage.as_decimal())
        .ok_or(MathError::Overflow("contracts"))?;
    let amount = notional
        .checked_div(entry_price)
        .ok_or(MathError::Overflow("contracts"))?;
    Ok(round_quantity(amount))
}

// 3.2: long liquidates at entry * (1 - 1/lev), short at entry * (1 + 1/lev).
// stored on the position, never enforced against a live price.
pub fn liquidation_price(entry_price: Decimal, leverage: Leverage, side: Side) -> Result<Decimal, MathError> {
    if entry_price <= Decimal::ZERO {
        return Err(MathError::NonPositivePrice(entry_price));
    }
    let fraction = Decimal::ONE
        .checked_div(leverage.as_decimal())
        .ok_or(MathError::DivisionByZero("liquidation_price"))?;
    let factor = match side {
        Side::Long => Decimal::ONE - fraction,
        Side::Short => Decimal::ONE + fraction,
    };
    let price = entry_price
        .checked_mul(factor)
        .ok_or(MathError::Overflow("liquidation_price"))?;
    Ok(round_money(price))
}

// 3.3: positive = profit. no floor at the locked margin.
pub fn realized_pnl(
    entry_price: Decimal,
    exit_price: Decimal,
    side: Side,
    amount: Decimal,
) -> Result<Decimal, MathError> {
    let move_per_unit = match side {
        Side::Long => exit_price - entry_price,
        Side::Short => entry_price - exit_price,
    };
    let pnl = amount
        .checked_mul(move_per_unit)
        .ok_or(MathError::Overflow("realized_pnl"))?;
    Ok(round_money(pnl))
}

// 3.4: usd value of a quantity at a price, rounded to money scale.
pub fn usd_value(amount: Decimal, price: Decimal) -> Result<Decimal, MathError> {
    amount
        .checked_mul(price)
        .map(round_money)
        .ok_or(MathError::Overflow("usd_value"))
}

// 3.5: how many units `usd` buys at `price`.
pub fn quantity_for(usd: Decimal, price: Decimal) -> Result<Decimal, MathError> {
    if price <= Decimal::ZERO {
        return Err(MathError::NonPositivePrice(price));
    }
    usd.checked_div(price)
        .map(round_quantity)
        .ok_or(MathError::Overflow("quantity_for"))
}

/// Cost-weighted running average after acquiring `added_qty` for `added_cost` USD.
///
/// Returns `(new_amount, new_avg_price)`. Fails if the resulting quantity is zero.
pub fn weighted_average(
    held_amount: Decimal,
    held_avg_price: Decimal,
    added_qty: Decimal,
    added_cost: Decimal,
) -> Result<(Decimal, Decimal), MathError> {
    let new_amount = held_amount + added_qty;
    if new_amount.is_zero() {
        return Err(MathError::DivisionByZero("weighted_average"));
    }
    let cost_before = held_amount
        .checked_mul(held_avg_price)
        .ok_or(MathError::Overflow("weighted_average"))?;
    let cost_after = cost_before
        .checked_add(added_cost)
        .ok_or(MathError::Overflow("weighted_average"))?;
    let avg = cost_after
        .checked_div(new_amount)
        .ok_or(MathError::Overflow("weighted_average"))?;
    Ok((new_amount, round_money(avg)))
}
