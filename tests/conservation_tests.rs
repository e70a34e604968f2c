//! Money conservation scenarios across the spot and futures engines.
//!
//! Every path that moves a balance is checked against exact decimal figures.

use papertrade_core::api::{Buy, BuyRequest, OpenPositionRequest, Sell};
use papertrade_core::events::EventPayload;
use papertrade_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn oracle() -> Arc<StaticPriceOracle> {
    Arc::new(
        StaticPriceOracle::new()
            .with_price("bitcoin", dec!(40000))
            .with_price("ethereum", dec!(2000)),
    )
}

fn engine_with(config: LedgerConfig, oracle: Arc<StaticPriceOracle>) -> Engine {
    Engine::new(config, oracle).unwrap()
}

fn demo_engine() -> Engine {
    engine_with(LedgerConfig::demo(), oracle())
}

fn open(symbol: &str, side: Side, margin: Decimal, leverage: u32, price: Decimal) -> OpenPosition {
    OpenPosition {
        symbol: symbol.to_string(),
        side,
        margin: Quote::new(margin),
        leverage: Leverage::new(leverage).unwrap(),
        entry_price: Price::new_unchecked(price),
    }
}

fn buy(coin: &str, symbol: &str, usd: Decimal, price: Decimal) -> Buy {
    Buy {
        coin_id: coin.to_string(),
        symbol: symbol.to_string(),
        amount_usd: Quote::new(usd),
        price: Price::new_unchecked(price),
    }
}

#[cfg(test)]
mod futures_scenarios {
    use super::*;

    /// 10000 balance, LONG BTC @ 30000, margin 1000, 10x, close @ 33000.
    #[tokio::test]
    async fn concrete_long_round_trip() {
        let engine = demo_engine();
        let user = UserId(1);
        engine.register_user(user);
        assert_eq!(engine.get_wallet(user).unwrap().balance.value(), dec!(10000));

        let opened = engine
            .open_position(user, open("BTC", Side::Long, dec!(1000), 10, dec!(30000)))
            .unwrap();
        assert_eq!(opened.contracts.round_dp(8), dec!(0.33333333));
        assert_eq!(opened.liquidation_price, dec!(27000));
        assert_eq!(engine.get_wallet(user).unwrap().balance.value(), dec!(9000));

        let closed = engine
            .close_position(
                user,
                ClosePosition {
                    position_id: opened.id,
                    price: Some(Price::new_unchecked(dec!(33000))),
                },
            )
            .await
            .unwrap();
        assert_eq!(closed.pnl.value(), dec!(1000));
        assert_eq!(closed.wallet_balance.value(), dec!(11000));
        assert_eq!(closed.closed_price.value(), dec!(33000));
    }

    #[test]
    fn open_close_at_entry_is_neutral() {
        let engine = demo_engine();
        let user = UserId(2);
        for (side, leverage, price) in [
            (Side::Long, 1, dec!(30000)),
            (Side::Short, 7, dec!(1234.56)),
            (Side::Long, 125, dec!(0.0042)),
            (Side::Short, 3, dec!(97.13)),
        ] {
            let before = engine.get_wallet(user).unwrap().balance;
            let opened = engine
                .open_position(user, open("ETH", side, dec!(333.33), leverage, price))
                .unwrap();
            let closed = engine
                .close_position_at(user, opened.id, Price::new_unchecked(price))
                .unwrap();
            assert_eq!(closed.pnl.value(), Decimal::ZERO);
            assert_eq!(closed.wallet_balance, before);
        }
    }

    #[test]
    fn balance_moves_only_by_margin_and_pnl() {
        let engine = demo_engine();
        let user = UserId(3);
        let start = engine.get_wallet(user).unwrap().balance.value();

        let a = engine
            .open_position(user, open("BTC", Side::Long, dec!(1500), 5, dec!(40000)))
            .unwrap();
        let b = engine
            .open_position(user, open("ETH", Side::Short, dec!(800), 20, dec!(2000)))
            .unwrap();
        let wallet = engine.get_wallet(user).unwrap();
        assert_eq!(wallet.balance.value(), start - dec!(2300));
        assert_eq!(wallet.locked_margin.value(), dec!(2300));

        let ca = engine
            .close_position_at(user, a.id, Price::new_unchecked(dec!(38000)))
            .unwrap();
        let cb = engine
            .close_position_at(user, b.id, Price::new_unchecked(dec!(1900)))
            .unwrap();
        assert_eq!(ca.pnl.value(), dec!(-375));
        assert_eq!(cb.pnl.value(), dec!(800));

        let end = engine.get_wallet(user).unwrap().balance.value();
        assert_eq!(end, start + ca.pnl.value() + cb.pnl.value());
    }

    #[test]
    fn validated_request_drives_open() {
        let engine = demo_engine();
        let request = OpenPositionRequest {
            symbol: Some("btc-usdt".into()),
            side: Some("SELL".into()),
            margin: Some("2000".into()),
            leverage: Some("4".into()),
            price: Some("50000".into()),
        };
        let cmd = request.validate(engine.config().futures.max_leverage).unwrap();
        let opened = engine.open_position(UserId(4), cmd).unwrap();
        assert_eq!(opened.side, Side::Short);
        assert_eq!(opened.symbol, "BTC-USDT");
        assert_eq!(opened.liquidation_price, dec!(62500));

        let json = serde_json::to_value(&opened).unwrap();
        for field in [
            "id",
            "symbol",
            "side",
            "entry_price",
            "contracts",
            "leverage",
            "margin_used",
            "liquidation_price",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["side"], "SHORT");
        assert_eq!(json["margin_used"], "2000");
    }

    #[tokio::test]
    async fn close_by_symbol_resolves_coin_id() {
        let engine = demo_engine();
        let opened = engine
            .open_position(UserId(5), open("BTCUSDT", Side::Long, dec!(1000), 2, dec!(38000)))
            .unwrap();
        let closed = engine
            .close_position(
                UserId(5),
                ClosePosition {
                    position_id: opened.id,
                    price: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(closed.closed_price.value(), dec!(40000));
        assert_eq!(closed.pnl.value(), dec!(105.26315789));
    }
}

#[cfg(test)]
mod spot_scenarios {
    use super::*;

    /// Holds 2 ETH; ETH 2000, BTC 40000; convert 1 ETH.
    #[tokio::test]
    async fn convert_scenario() {
        let engine = demo_engine();
        let user = UserId(10);
        engine.deposit(user, Quote::new(dec!(3000))).unwrap();
        engine.buy(user, buy("ethereum", "ETH", dec!(3000), dec!(1500))).unwrap();
        assert_eq!(engine.spot_holding(user, "ethereum").unwrap().amount, dec!(2));

        let receipt = engine
            .convert(
                user,
                Convert {
                    from_coin: "ethereum".into(),
                    to_coin: "bitcoin".into(),
                    amount: dec!(1),
                },
            )
            .await
            .unwrap();
        assert_eq!(receipt.usd_value.value(), dec!(2000));
        assert_eq!(receipt.to_amount, dec!(0.05));

        assert_eq!(engine.spot_holding(user, "ethereum").unwrap().amount, dec!(1));
        let btc = engine.spot_holding(user, "bitcoin").unwrap();
        assert_eq!(btc.amount, dec!(0.05));
        assert_eq!(btc.avg_price, dec!(40000));
        // fiat never moves on a convert
        assert_eq!(engine.spot_balance(user).unwrap().value(), dec!(0));
    }

    #[tokio::test]
    async fn converting_whole_holding_deletes_row() {
        let engine = demo_engine();
        let user = UserId(11);
        engine.deposit(user, Quote::new(dec!(2000))).unwrap();
        engine.buy(user, buy("ethereum", "ETH", dec!(2000), dec!(2000))).unwrap();

        engine
            .convert(
                user,
                Convert {
                    from_coin: "ethereum".into(),
                    to_coin: "bitcoin".into(),
                    amount: dec!(1),
                },
            )
            .await
            .unwrap();
        assert!(engine.spot_holding(user, "ethereum").is_none());
        let wallet = engine.spot_wallet(user).await.unwrap();
        assert_eq!(wallet.assets.len(), 1);
        assert_eq!(wallet.total_asset_value.value(), dec!(2000));
    }

    #[test]
    fn sell_over_holding_leaves_row_unchanged() {
        let engine = demo_engine();
        let user = UserId(12);
        engine.deposit(user, Quote::new(dec!(1000))).unwrap();
        engine.buy(user, buy("bitcoin", "BTC", dec!(1000), dec!(40000))).unwrap();
        let before = engine.spot_holding(user, "bitcoin").unwrap();

        let err = engine
            .sell(
                user,
                Sell {
                    coin_id: "bitcoin".into(),
                    amount: dec!(0.025000000000000001),
                    price: Price::new_unchecked(dec!(40000)),
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds(_)));
        assert_eq!(engine.spot_holding(user, "bitcoin").unwrap(), before);
        assert_eq!(engine.spot_balance(user).unwrap().value(), dec!(0));
    }

    #[test]
    fn buy_sell_cash_flow_matches() {
        let engine = demo_engine();
        let user = UserId(13);
        engine.deposit(user, Quote::new(dec!(10000))).unwrap();

        let buys = [dec!(1000), dec!(2500.55), dec!(333.33)];
        for (usd, price) in buys.iter().zip([dec!(40000), dec!(41234.5), dec!(39999.99)]) {
            engine.buy(user, buy("bitcoin", "BTC", *usd, price)).unwrap();
        }
        let held = engine.spot_holding(user, "bitcoin").unwrap().amount;
        let half = (held / dec!(2)).round_dp(18);
        let first = engine
            .sell(
                user,
                Sell {
                    coin_id: "bitcoin".into(),
                    amount: half,
                    price: Price::new_unchecked(dec!(42000)),
                },
            )
            .unwrap();
        let rest = engine.spot_holding(user, "bitcoin").unwrap().amount;
        let second = engine
            .sell(
                user,
                Sell {
                    coin_id: "bitcoin".into(),
                    amount: rest,
                    price: Price::new_unchecked(dec!(38000)),
                },
            )
            .unwrap();
        assert!(engine.spot_holding(user, "bitcoin").is_none());

        let spent: Decimal = buys.iter().sum();
        let returned = first.returned.value() + second.returned.value();
        let balance = engine.spot_balance(user).unwrap().value();
        assert_eq!(dec!(10000) - balance, spent - returned);
    }

    #[test]
    fn raw_buy_request_validation() {
        let engine = demo_engine();
        let request = BuyRequest {
            coin_id: Some("bitcoin".into()),
            symbol: Some("BTC".into()),
            amount: Some("abc".into()),
            price: Some("40000".into()),
        };
        let err = request
            .validate()
            .map_err(EngineError::from)
            .and_then(|cmd| engine.buy(UserId(14), cmd))
            .unwrap_err();
        let (status, body) = api::error_response(&err);
        assert_eq!(status, 400);
        assert_eq!(body.error, "amount must be a number");
    }
}

#[cfg(test)]
mod journal {
    use super::*;

    #[tokio::test]
    async fn every_committed_move_is_recorded() {
        let engine = demo_engine();
        let user = UserId(20);
        engine.register_user(user);
        engine.deposit(user, Quote::new(dec!(500))).unwrap();
        engine.buy(user, buy("bitcoin", "BTC", dec!(400), dec!(40000))).unwrap();
        engine
            .sell(
                user,
                Sell {
                    coin_id: "bitcoin".into(),
                    amount: dec!(0.005),
                    price: Price::new_unchecked(dec!(40000)),
                },
            )
            .unwrap();
        let opened = engine
            .open_position(user, open("ETH", Side::Long, dec!(100), 2, dec!(2000)))
            .unwrap();
        engine
            .close_position_at(user, opened.id, Price::new_unchecked(dec!(2100)))
            .unwrap();
        // rejected operations leave no trace
        let _ = engine.withdraw(user, Quote::new(dec!(100000)));

        let kinds: Vec<&'static str> = engine
            .events_for(user)
            .iter()
            .map(|e| match e.payload {
                EventPayload::WalletProvisioned(_) => "provisioned",
                EventPayload::Deposit(_) => "deposit",
                EventPayload::Withdrawal(_) => "withdrawal",
                EventPayload::SpotBuy(_) => "buy",
                EventPayload::SpotSell(_) => "sell",
                EventPayload::SpotConvert(_) => "convert",
                EventPayload::PositionOpened(_) => "opened",
                EventPayload::PositionClosed(_) => "closed",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["provisioned", "provisioned", "deposit", "buy", "sell", "opened", "closed"]
        );
    }
}
