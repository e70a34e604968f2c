//! Futures wallet operations: open, list, close and the wallet view.

use super::core::Engine;
use super::results::{ClosedPosition, EngineError, FuturesWalletView, OpenedPosition};
use crate::api::{ensure_positive, ClosePosition, OpenPosition, ValidationError};
use crate::events::{EventPayload, PositionClosedEvent, PositionOpenedEvent};
use crate::position::FuturesPosition;
use crate::price_feed::{resolve_coin_id, PriceOracle};
use crate::store::StoreError;
use crate::types::{Leverage, PositionId, Price, Timestamp, UserId};
use tracing::{debug, info, warn};

impl Engine {
    /// Lock `margin` from the futures wallet into a new OPEN position.
    pub fn open_position(&self, user: UserId, cmd: OpenPosition) -> Result<OpenedPosition, EngineError> {
        let max_leverage = self.config.futures.max_leverage.min(Leverage::MAX);
        if cmd.leverage.value() > max_leverage {
            return Err(ValidationError::LeverageOutOfRange {
                min: Leverage::MIN,
                max: max_leverage,
            }
            .into());
        }
        ensure_positive("margin", cmd.margin.value())?;
        if cmd.symbol.trim().is_empty() {
            return Err(ValidationError::Missing("symbol").into());
        }

        self.ensure_futures_wallet(user);
        let id = self.store.next_position_id();

        let (opened, balance) = self.store.futures_txn::<_, EngineError>(user, |account| {
            account.reserve_margin(cmd.margin)?;
            // sizing failure after the debit aborts the txn, which puts the margin back
            let position = FuturesPosition::open(
                id,
                user,
                &cmd.symbol,
                cmd.side,
                cmd.entry_price,
                cmd.margin,
                cmd.leverage,
                Timestamp::now(),
            )
            .map_err(|e| {
                warn!(%user, error = %e, "position sizing failed, margin not locked");
                e
            })?;
            let position = account.insert_position(position);
            Ok((
                OpenedPosition {
                    id: position.id,
                    symbol: position.symbol.clone(),
                    side: position.side,
                    entry_price: position.entry_price,
                    contracts: position.amount,
                    leverage: position.leverage,
                    margin_used: position.initial_margin,
                    liquidation_price: position.liquidation_price,
                },
                account.balance(),
            ))
        })?;

        info!(
            %user,
            position = %opened.id,
            symbol = %opened.symbol,
            side = %opened.side,
            entry = %opened.entry_price,
            leverage = %opened.leverage,
            margin = %opened.margin_used,
            %balance,
            "position opened"
        );
        self.emit_event(
            user,
            EventPayload::PositionOpened(PositionOpenedEvent {
                position_id: opened.id,
                symbol: opened.symbol.clone(),
                side: opened.side,
                entry_price: opened.entry_price,
                contracts: opened.contracts,
                leverage: opened.leverage,
                margin: opened.margin_used,
                new_balance: balance,
            }),
        );
        Ok(opened)
    }

    /// Every OPEN position the user holds, in the order they were opened.
    pub fn get_open_positions(&self, user: UserId) -> Result<Vec<FuturesPosition>, EngineError> {
        match self
            .store
            .read_futures(user, |account| account.open_positions().cloned().collect())
        {
            Ok(positions) => Ok(positions),
            Err(StoreError::MissingFuturesWallet(_)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Close at the caller's price, or at the live price when none is given.
    ///
    /// The oracle is consulted before any lock is taken; `close_position_at`
    /// re-checks that the position is still open.
    pub async fn close_position(&self, user: UserId, cmd: ClosePosition) -> Result<ClosedPosition, EngineError> {
        let id = cmd.position_id;
        let symbol = match self
            .store
            .read_futures(user, |account| account.open_position(id).map(|p| p.symbol.clone()))
        {
            Ok(Some(symbol)) => symbol,
            Ok(None) | Err(StoreError::MissingFuturesWallet(_)) => {
                return Err(EngineError::NotFound(format!("Open position {id} not found")));
            }
            Err(e) => return Err(e.into()),
        };

        let price = match cmd.price {
            Some(price) => price,
            None => {
                let coin_id = resolve_coin_id(&symbol);
                debug!(%user, position = %id, %coin_id, "fetching close price");
                self.prices.get_price(&coin_id).await?
            }
        };

        self.close_position_at(user, id, price)
    }

    pub fn close_position_at(
        &self,
        user: UserId,
        id: PositionId,
        price: Price,
    ) -> Result<ClosedPosition, EngineError> {
        if !self.store.has_futures_wallet(user) {
            return Err(EngineError::NotFound(format!("Open position {id} not found")));
        }
        let (pnl, margin, balance) = self.store.futures_txn::<_, EngineError>(user, |account| {
            let closed = account.settle_position(id, price, Timestamp::now())?;
            let (pnl, margin) = (closed.pnl, closed.initial_margin);
            Ok((pnl, margin, account.balance()))
        })?;

        // losses are not floored at the margin; the wallet can go below zero
        if balance.is_negative() {
            warn!(%user, position = %id, %pnl, %balance, "futures balance negative after close");
        }
        info!(%user, position = %id, exit = %price, %pnl, %balance, "position closed");
        self.emit_event(
            user,
            EventPayload::PositionClosed(PositionClosedEvent {
                position_id: id,
                exit_price: price,
                realized_pnl: pnl,
                margin_returned: margin,
                new_balance: balance,
            }),
        );
        Ok(ClosedPosition {
            pnl,
            wallet_balance: balance,
            closed_price: price,
        })
    }

    /// Current futures balance. Provisions the wallet on first access.
    pub fn get_wallet(&self, user: UserId) -> Result<FuturesWalletView, EngineError> {
        self.ensure_futures_wallet(user);
        let (balance, locked_margin, open_positions) = self.store.read_futures(user, |account| {
            (
                account.balance(),
                account.locked_margin(),
                account.open_positions().count(),
            )
        })?;
        Ok(FuturesWalletView {
            balance,
            locked_margin: locked_margin?,
            open_positions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::price_feed::StaticPriceOracle;
    use crate::types::{PositionStatus, Quote, Side};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const BOB: UserId = UserId(2);

    fn engine() -> (Engine, Arc<StaticPriceOracle>) {
        let oracle = Arc::new(StaticPriceOracle::new().with_price("bitcoin", dec!(33000)));
        let mut config = LedgerConfig::demo();
        config.oracle.cache_ttl_secs = 0;
        config.oracle.max_retries = 0;
        (Engine::new(config, oracle.clone()).unwrap(), oracle)
    }

    fn btc_long(margin: rust_decimal::Decimal, leverage: u32) -> OpenPosition {
        OpenPosition {
            symbol: "btc".to_string(),
            side: Side::Long,
            margin: Quote::new(margin),
            leverage: Leverage::new(leverage).unwrap(),
            entry_price: Price::new_unchecked(dec!(30000)),
        }
    }

    fn close(id: PositionId, price: Option<rust_decimal::Decimal>) -> ClosePosition {
        ClosePosition {
            position_id: id,
            price: price.map(Price::new_unchecked),
        }
    }

    #[test]
    fn open_locks_margin_and_returns_detail() {
        let (engine, _) = engine();
        let opened = engine.open_position(BOB, btc_long(dec!(1000), 10)).unwrap();

        assert_eq!(opened.symbol, "BTC");
        assert_eq!(opened.contracts, dec!(0.333333333333333333));
        assert_eq!(opened.liquidation_price, dec!(27000));
        assert_eq!(opened.margin_used.value(), dec!(1000));

        let wallet = engine.get_wallet(BOB).unwrap();
        assert_eq!(wallet.balance.value(), dec!(9000));
        assert_eq!(wallet.locked_margin.value(), dec!(1000));
        assert_eq!(wallet.open_positions, 1);
    }

    #[test]
    fn open_beyond_balance_fails_cleanly() {
        let (engine, _) = engine();
        let err = engine.open_position(BOB, btc_long(dec!(10000.01), 10)).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds(_)));
        assert_eq!(engine.get_wallet(BOB).unwrap().balance.value(), dec!(10000));
        assert!(engine.get_open_positions(BOB).unwrap().is_empty());
    }

    #[test]
    fn configured_leverage_cap_applies() {
        let oracle = Arc::new(StaticPriceOracle::new());
        let mut config = LedgerConfig::demo();
        config.futures.max_leverage = 20;
        let engine = Engine::new(config, oracle).unwrap();

        let err = engine.open_position(BOB, btc_long(dec!(100), 50)).unwrap_err();
        assert_eq!(err, EngineError::Validation("leverage must be between 1 and 20".to_string()));
    }

    #[tokio::test]
    async fn close_at_explicit_price() {
        let (engine, _) = engine();
        let opened = engine.open_position(BOB, btc_long(dec!(1000), 10)).unwrap();

        let closed = engine.close_position(BOB, close(opened.id, Some(dec!(33000)))).await.unwrap();
        assert_eq!(closed.pnl.value(), dec!(1000));
        assert_eq!(closed.wallet_balance.value(), dec!(11000));

        let row = engine
            .store
            .read_futures(BOB, |a| a.positions[0].clone())
            .unwrap();
        assert_eq!(row.status, PositionStatus::Closed);
        assert!(row.closed_at.is_some());
    }

    #[tokio::test]
    async fn close_uses_oracle_when_no_price() {
        let (engine, _) = engine();
        let opened = engine.open_position(BOB, btc_long(dec!(1000), 10)).unwrap();

        let closed = engine.close_position(BOB, close(opened.id, None)).await.unwrap();
        assert_eq!(closed.closed_price.value(), dec!(33000));
        assert_eq!(closed.pnl.value(), dec!(1000));
    }

    #[tokio::test]
    async fn oracle_down_leaves_position_open() {
        let (engine, oracle) = engine();
        let opened = engine.open_position(BOB, btc_long(dec!(1000), 10)).unwrap();
        oracle.set_healthy(false);

        let err = engine.close_position(BOB, close(opened.id, None)).await.unwrap_err();
        assert_eq!(err.status_code(), 503);
        assert_eq!(engine.get_open_positions(BOB).unwrap().len(), 1);
        assert_eq!(engine.get_wallet(BOB).unwrap().balance.value(), dec!(9000));
    }

    #[tokio::test]
    async fn cannot_close_twice_or_someone_elses() {
        let (engine, _) = engine();
        let opened = engine.open_position(BOB, btc_long(dec!(1000), 10)).unwrap();

        let stranger = engine.close_position(UserId(3), close(opened.id, Some(dec!(1)))).await;
        assert_eq!(stranger.unwrap_err().status_code(), 404);

        engine.close_position(BOB, close(opened.id, Some(dec!(30000)))).await.unwrap();
        let again = engine.close_position(BOB, close(opened.id, Some(dec!(30000)))).await;
        assert_eq!(again.unwrap_err().status_code(), 404);
        assert_eq!(engine.get_wallet(BOB).unwrap().balance.value(), dec!(10000));
    }

    #[test]
    fn short_loss_beyond_margin_is_applied() {
        let (engine, _) = engine();
        let mut cmd = btc_long(dec!(1000), 10);
        cmd.side = Side::Short;
        let opened = engine.open_position(BOB, cmd).unwrap();

        // loss of 11000 on 1000 margin
        let closed = engine
            .close_position_at(BOB, opened.id, Price::new_unchecked(dec!(63000)))
            .unwrap();
        assert_eq!(closed.pnl.value(), dec!(-11000));
        assert_eq!(closed.wallet_balance.value(), dec!(-1000));
    }

    #[test]
    fn listing_skips_closed_positions() {
        let (engine, _) = engine();
        let first = engine.open_position(BOB, btc_long(dec!(100), 5)).unwrap();
        let second = engine.open_position(BOB, btc_long(dec!(200), 5)).unwrap();
        engine
            .close_position_at(BOB, first.id, Price::new_unchecked(dec!(30000)))
            .unwrap();

        let open = engine.get_open_positions(BOB).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, second.id);
        assert!(engine.get_open_positions(UserId(99)).unwrap().is_empty());
    }
}
