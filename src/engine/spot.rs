//! Spot wallet operations: fiat moves, buy, sell, convert and the portfolio view.

use super::core::Engine;
use super::results::{
    AssetView, BalanceReceipt, BuyReceipt, ConvertPreview, ConvertReceipt, EngineError, SellReceipt,
    SpotWalletView,
};
use crate::account::SpotAsset;
use crate::api::{ensure_positive, Buy, Convert, Sell, ValidationError};
use crate::events::{BalanceMoveEvent, EventPayload, SpotConvertEvent, SpotTradeEvent};
use crate::ledger;
use crate::price_feed::{OracleError, PriceOracle};
use crate::types::{Price, Quote, UserId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info, warn};

// display code for a coin the user never bought directly
fn default_symbol(coin_id: &str) -> String {
    coin_id.chars().take(5).collect::<String>().to_uppercase()
}

fn validate_convert(cmd: &Convert) -> Result<(), ValidationError> {
    ensure_positive("amount", cmd.amount)?;
    if cmd.from_coin.trim().is_empty() {
        return Err(ValidationError::Missing("from_coin"));
    }
    if cmd.to_coin.trim().is_empty() {
        return Err(ValidationError::Missing("to_coin"));
    }
    if cmd.from_coin == cmd.to_coin {
        return Err(ValidationError::SameCoin);
    }
    Ok(())
}

fn pick(prices: &HashMap<String, Price>, coin_id: &str) -> Result<Price, OracleError> {
    prices
        .get(coin_id)
        .copied()
        .ok_or_else(|| OracleError::Missing(coin_id.to_string()))
}

impl Engine {
    pub fn spot_balance(&self, user: UserId) -> Result<Quote, EngineError> {
        self.ensure_spot_wallet(user);
        Ok(self.store.read_spot(user, |account| account.balance())?)
    }

    /// The user's row for `coin_id`, if they hold any.
    pub fn spot_holding(&self, user: UserId, coin_id: &str) -> Option<SpotAsset> {
        self.store
            .read_spot(user, |account| account.holding(coin_id).cloned())
            .ok()
            .flatten()
    }

    pub fn deposit(&self, user: UserId, amount: Quote) -> Result<BalanceReceipt, EngineError> {
        ensure_positive("amount", amount.value())?;
        self.ensure_spot_wallet(user);

        let balance = self.store.spot_txn::<_, EngineError>(user, |account| {
            account.credit(amount)?;
            Ok(account.balance())
        })?;

        info!(%user, %amount, %balance, "spot deposit");
        self.emit_event(
            user,
            EventPayload::Deposit(BalanceMoveEvent {
                amount,
                new_balance: balance,
            }),
        );
        Ok(BalanceReceipt { amount, balance })
    }

    pub fn withdraw(&self, user: UserId, amount: Quote) -> Result<BalanceReceipt, EngineError> {
        ensure_positive("amount", amount.value())?;
        self.ensure_spot_wallet(user);

        let balance = self.store.spot_txn::<_, EngineError>(user, |account| {
            account.debit(amount)?;
            Ok(account.balance())
        })?;

        info!(%user, %amount, %balance, "spot withdrawal");
        self.emit_event(
            user,
            EventPayload::Withdrawal(BalanceMoveEvent {
                amount,
                new_balance: balance,
            }),
        );
        Ok(BalanceReceipt { amount, balance })
    }

    // 8.2: debit fiat, credit the coin at qty = usd / price
    pub fn buy(&self, user: UserId, cmd: Buy) -> Result<BuyReceipt, EngineError> {
        ensure_positive("amount", cmd.amount_usd.value())?;
        let quantity = ledger::quantity_for(cmd.amount_usd.value(), cmd.price.value())?;
        if quantity.is_zero() {
            return Err(ValidationError::NotPositive("quantity").into());
        }
        self.ensure_spot_wallet(user);

        let receipt = self.store.spot_txn::<_, EngineError>(user, |account| {
            account.debit(cmd.amount_usd)?;
            let row = account.acquire(&cmd.coin_id, &cmd.symbol, quantity, cmd.amount_usd)?;
            Ok(BuyReceipt {
                coin_id: row.coin_id.clone(),
                symbol: row.symbol.clone(),
                quantity,
                holding: row.amount,
                avg_price: row.avg_price,
                balance: account.balance(),
            })
        })?;

        info!(
            %user,
            coin = %receipt.coin_id,
            %quantity,
            price = %cmd.price,
            balance = %receipt.balance,
            "spot buy"
        );
        self.emit_event(
            user,
            EventPayload::SpotBuy(SpotTradeEvent {
                coin_id: receipt.coin_id.clone(),
                quantity,
                price: cmd.price,
                usd_value: cmd.amount_usd,
                new_balance: receipt.balance,
            }),
        );
        Ok(receipt)
    }

    // 8.3: take coins out, credit amount * price
    pub fn sell(&self, user: UserId, cmd: Sell) -> Result<SellReceipt, EngineError> {
        ensure_positive("amount", cmd.amount)?;
        let returned = Quote::new(ledger::usd_value(cmd.amount, cmd.price.value())?);
        self.ensure_spot_wallet(user);

        let receipt = self.store.spot_txn::<_, EngineError>(user, |account| {
            let remaining = account.release(&cmd.coin_id, cmd.amount)?;
            account.credit(returned)?;
            Ok(SellReceipt {
                coin_id: cmd.coin_id.clone(),
                returned,
                remaining,
                balance: account.balance(),
            })
        })?;

        info!(
            %user,
            coin = %receipt.coin_id,
            amount = %cmd.amount,
            %returned,
            balance = %receipt.balance,
            "spot sell"
        );
        self.emit_event(
            user,
            EventPayload::SpotSell(SpotTradeEvent {
                coin_id: receipt.coin_id.clone(),
                quantity: cmd.amount,
                price: cmd.price,
                usd_value: returned,
                new_balance: receipt.balance,
            }),
        );
        Ok(receipt)
    }

    // quote both legs in one batched lookup
    async fn convert_quote(&self, cmd: &Convert) -> Result<(Quote, Decimal), EngineError> {
        let ids = [cmd.from_coin.clone(), cmd.to_coin.clone()];
        let prices = self.prices.get_prices(&ids).await?;
        let from_price = pick(&prices, &cmd.from_coin)?;
        let to_price = pick(&prices, &cmd.to_coin)?;

        let usd_value = ledger::usd_value(cmd.amount, from_price.value())?;
        let to_amount = ledger::quantity_for(usd_value, to_price.value())?;
        Ok((Quote::new(usd_value), to_amount))
    }

    /// Swap one holding into another at live prices.
    ///
    /// Ownership is checked before the oracle call and again inside the
    /// transaction, so a sell that lands during the lookup cannot be spent twice.
    pub async fn convert(&self, user: UserId, cmd: Convert) -> Result<ConvertReceipt, EngineError> {
        validate_convert(&cmd)?;
        self.ensure_spot_wallet(user);

        self.store.read_spot(user, |account| match account.holding(&cmd.from_coin) {
            None => Err(EngineError::NotFound(format!("You don't own {}", cmd.from_coin))),
            Some(held) if held.amount < cmd.amount => Err(EngineError::InsufficientFunds(format!(
                "Not enough {} to convert: requested {}, held {}",
                cmd.from_coin, cmd.amount, held.amount
            ))),
            Some(_) => Ok(()),
        })??;

        let (usd_value, to_amount) = self.convert_quote(&cmd).await?;
        if to_amount.is_zero() {
            return Err(ValidationError::NotPositive("amount").into());
        }

        self.store.spot_txn::<_, EngineError>(user, |account| {
            account.release(&cmd.from_coin, cmd.amount)?;
            account.acquire(&cmd.to_coin, &default_symbol(&cmd.to_coin), to_amount, usd_value)?;
            Ok(())
        })?;

        info!(
            %user,
            from = %cmd.from_coin,
            to = %cmd.to_coin,
            from_amount = %cmd.amount,
            %to_amount,
            %usd_value,
            "spot convert"
        );
        self.emit_event(
            user,
            EventPayload::SpotConvert(SpotConvertEvent {
                from_coin: cmd.from_coin.clone(),
                to_coin: cmd.to_coin.clone(),
                from_amount: cmd.amount,
                to_amount,
                usd_value,
            }),
        );
        Ok(ConvertReceipt {
            from_coin: cmd.from_coin,
            to_coin: cmd.to_coin,
            from_amount: cmd.amount,
            to_amount,
            usd_value,
        })
    }

    /// Read-only quote for `convert`. The user does not need to hold the coin.
    pub async fn convert_preview(&self, user: UserId, cmd: Convert) -> Result<ConvertPreview, EngineError> {
        validate_convert(&cmd)?;
        let (_, to_amount) = self.convert_quote(&cmd).await?;

        let to_symbol = self
            .store
            .read_spot(user, |account| account.holding(&cmd.to_coin).map(|a| a.symbol.clone()))
            .ok()
            .flatten()
            .unwrap_or_else(|| default_symbol(&cmd.to_coin));

        debug!(%user, from = %cmd.from_coin, to = %cmd.to_coin, %to_amount, "convert preview");
        Ok(ConvertPreview {
            from_coin: cmd.from_coin,
            to_coin: cmd.to_coin,
            from_amount: cmd.amount,
            to_amount,
            to_symbol,
        })
    }

    /// Fiat balance plus every holding valued at its live price.
    ///
    /// A coin the oracle cannot price is valued at zero; an oracle outage
    /// degrades every holding that way instead of failing the call.
    pub async fn spot_wallet(&self, user: UserId) -> Result<SpotWalletView, EngineError> {
        self.ensure_spot_wallet(user);
        let (balance, holdings) = self
            .store
            .read_spot(user, |account| {
                (account.balance(), account.assets.values().cloned().collect::<Vec<_>>())
            })?;

        let live = if holdings.is_empty() {
            HashMap::new()
        } else {
            let ids: Vec<String> = holdings.iter().map(|a| a.coin_id.clone()).collect();
            match self.prices.get_prices(&ids).await {
                Ok(prices) => prices,
                Err(e) => {
                    warn!(%user, error = %e, "live prices unavailable, holdings valued at zero");
                    HashMap::new()
                }
            }
        };

        let mut assets = Vec::with_capacity(holdings.len());
        for asset in holdings {
            let live_price = match live.get(&asset.coin_id) {
                Some(p) => p.value(),
                None => {
                    if !live.is_empty() {
                        warn!(%user, coin = %asset.coin_id, "no live price, valued at zero");
                    }
                    Decimal::ZERO
                }
            };
            let usd_value = Quote::new(ledger::usd_value(asset.amount, live_price)?);
            assets.push(AssetView {
                coin_id: asset.coin_id,
                symbol: asset.symbol,
                amount: asset.amount,
                avg_price: asset.avg_price,
                live_price,
                usd_value,
            });
        }

        let holdings_value = Quote::checked_sum(assets.iter().map(|a| a.usd_value))?;
        let total_asset_value = balance.checked_add(holdings_value)?;
        debug!(%user, %balance, assets = assets.len(), "spot wallet read");
        Ok(SpotWalletView {
            balance,
            total_asset_value,
            assets,
        })
    }
}
