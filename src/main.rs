//! Paper trading ledger simulation.
//!
//! Runs the spot and futures engines against fixed oracle prices: wallet
//! funding, buys and sells, conversions, a leveraged round trip, request
//! validation, concurrent writers and an oracle outage.

use papertrade_core::api::{self, BuyRequest, OpenPositionRequest, SellRequest};
use papertrade_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type SimResult = Result<(), Box<dyn Error>>;

#[tokio::main]
async fn main() -> SimResult {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = LedgerConfig::from_env()?;
    if config.futures.starting_balance.is_zero() {
        config.futures.starting_balance = dec!(10000);
    }

    println!("Paper Trading Ledger Simulation");
    println!("Environment: {:?}, futures allowance ${}\n", config.environment, config.futures.starting_balance);

    scenario_1_spot_basics(&config).await?;
    scenario_2_convert(&config).await?;
    scenario_3_futures_round_trip(&config).await?;
    scenario_4_request_validation(&config)?;
    scenario_5_concurrent_writers(&config).await?;
    scenario_6_oracle_outage(&config).await?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn market() -> StaticPriceOracle {
    StaticPriceOracle::new()
        .with_price("bitcoin", dec!(40000))
        .with_price("ethereum", dec!(2000))
        .with_price("solana", dec!(100))
}

fn engine_for(config: &LedgerConfig, oracle: Arc<StaticPriceOracle>) -> Result<Engine, ConfigError> {
    Engine::new(config.clone(), oracle)
}

/// Deposit, buy, sell and read the portfolio.
async fn scenario_1_spot_basics(config: &LedgerConfig) -> SimResult {
    println!("Scenario 1: Spot Basics\n");

    let oracle = Arc::new(market());
    let engine = engine_for(config, oracle.clone())?;
    let alice = UserId(1);
    engine.register_user(alice);

    let receipt = engine.deposit(alice, Quote::new(dec!(10000)))?;
    println!("  Alice deposits $10,000, balance ${}", receipt.balance);

    let buy = BuyRequest {
        coin_id: Some("bitcoin".into()),
        symbol: Some("btc".into()),
        amount: Some("4000".into()),
        price: Some("40000".into()),
    }
    .validate()?;
    let bought = engine.buy(alice, buy)?;
    println!("  Buys {} BTC for $4,000 @ $40,000, balance ${}", bought.quantity, bought.balance);

    let sell = SellRequest {
        coin_id: Some("bitcoin".into()),
        amount: Some("0.04".into()),
        price: Some("45000".into()),
    }
    .validate()?;
    let sold = engine.sell(alice, sell)?;
    println!("  Sells 0.04 BTC @ $45,000, returned ${}, {} BTC left", sold.returned, sold.remaining);

    oracle.set_price("bitcoin", dec!(50000));
    engine.prices().invalidate();
    let wallet = engine.spot_wallet(alice).await?;
    println!("  BTC marks to $50,000");
    for asset in &wallet.assets {
        println!(
            "  {} {} avg ${} live ${} = ${}",
            asset.amount, asset.symbol, asset.avg_price, asset.live_price, asset.usd_value
        );
    }
    println!("  Portfolio: ${} (cash ${})\n", wallet.total_asset_value, wallet.balance);
    Ok(())
}

/// Preview, then execute, an ETH to BTC conversion.
async fn scenario_2_convert(config: &LedgerConfig) -> SimResult {
    println!("Scenario 2: Convert\n");

    let engine = engine_for(config, Arc::new(market()))?;
    let alice = UserId(1);
    engine.deposit(alice, Quote::new(dec!(4000)))?;
    engine.buy(
        alice,
        api::Buy {
            coin_id: "ethereum".into(),
            symbol: "ETH".into(),
            amount_usd: Quote::new(dec!(4000)),
            price: Price::new_unchecked(dec!(2000)),
        },
    )?;
    println!("  Alice holds 2 ETH");

    let cmd = Convert {
        from_coin: "ethereum".into(),
        to_coin: "bitcoin".into(),
        amount: dec!(1),
    };
    let preview = engine.convert_preview(alice, cmd.clone()).await?;
    println!("  Preview: 1 ETH -> {} {}", preview.to_amount, preview.to_symbol);

    let done = engine.convert(alice, cmd).await?;
    println!("  Converted {} ETH into {} BTC (${})", done.from_amount, done.to_amount, done.usd_value);

    let wallet = engine.spot_wallet(alice).await?;
    for asset in &wallet.assets {
        println!("  {} {} avg ${}", asset.amount, asset.symbol, asset.avg_price);
    }
    println!();
    Ok(())
}

/// 10x long on BTC: open at $30k, close at $33k.
async fn scenario_3_futures_round_trip(config: &LedgerConfig) -> SimResult {
    println!("Scenario 3: Futures Round Trip\n");

    let oracle = Arc::new(market());
    let engine = engine_for(config, oracle.clone())?;
    let bob = UserId(2);
    engine.register_user(bob);
    println!("  Bob starts with ${}", engine.get_wallet(bob)?.balance);

    let request = OpenPositionRequest {
        symbol: Some("btc".into()),
        side: Some("buy".into()),
        margin: Some("1000".into()),
        leverage: Some(10u32.into()),
        price: Some("30000".into()),
    };
    let opened = engine.open_position(bob, request.validate(config.futures.max_leverage)?)?;
    println!(
        "  Opens {} {} @ ${}: {} contracts, {}, liquidation ${}",
        opened.side, opened.symbol, opened.entry_price, opened.contracts, opened.leverage, opened.liquidation_price
    );
    println!("  Wallet after margin lock: ${}", engine.get_wallet(bob)?.balance);
    println!("  Open positions: {}", engine.get_open_positions(bob)?.len());

    oracle.set_price("bitcoin", dec!(33000));
    engine.prices().invalidate();
    let closed = engine
        .close_position(
            bob,
            ClosePosition {
                position_id: opened.id,
                price: None,
            },
        )
        .await?;
    println!(
        "  Closes at live ${}: pnl ${}, wallet ${}",
        closed.closed_price, closed.pnl, closed.wallet_balance
    );
    println!("  Response body: {}\n", serde_json::to_string(&closed)?);
    Ok(())
}

/// Bad requests never reach the ledger.
fn scenario_4_request_validation(config: &LedgerConfig) -> SimResult {
    println!("Scenario 4: Request Validation\n");

    let engine = engine_for(config, Arc::new(market()))?;
    let carol = UserId(3);
    let before = engine.get_wallet(carol)?.balance;

    let bad_requests = [
        ("sideways", "10", "1000"),
        ("long", "500", "1000"),
        ("short", "10", "-5"),
    ];
    for (side, leverage, margin) in bad_requests {
        let request = OpenPositionRequest {
            symbol: Some("eth".into()),
            side: Some(side.into()),
            margin: Some(margin.into()),
            leverage: Some(leverage.into()),
            price: Some("2000".into()),
        };
        let outcome = request
            .validate(config.futures.max_leverage)
            .map_err(EngineError::from)
            .and_then(|cmd| engine.open_position(carol, cmd));
        if let Err(err) = outcome {
            let (status, body) = api::error_response(&err);
            println!("  side={side} leverage={leverage} margin={margin}: {status} {}", body.error);
        }
    }

    let too_big = OpenPositionRequest {
        symbol: Some("eth".into()),
        side: Some("long".into()),
        margin: Some("1000000".into()),
        leverage: Some("5".into()),
        price: Some("2000".into()),
    };
    if let Err(err) = engine.open_position(carol, too_big.validate(config.futures.max_leverage)?) {
        let (status, body) = api::error_response(&err);
        println!("  margin above balance: {status} {}", body.error);
    }

    println!("  Balance unchanged: ${} -> ${}\n", before, engine.get_wallet(carol)?.balance);
    Ok(())
}

/// Many tasks hitting the same wallet at once.
async fn scenario_5_concurrent_writers(config: &LedgerConfig) -> SimResult {
    println!("Scenario 5: Concurrent Writers\n");

    let engine = Arc::new(engine_for(config, Arc::new(market()))?);
    let dave = UserId(4);
    let tasks = 50;

    let mut handles = Vec::new();
    for i in 0..tasks {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.ensure_spot_wallet(dave);
            engine.ensure_futures_wallet(dave);
            engine.deposit(dave, Quote::new(Decimal::from(10 + i)))
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let expected: Decimal = (0..tasks).map(|i| Decimal::from(10 + i)).sum();
    let wallet = engine.spot_wallet(dave).await?;
    println!("  {tasks} concurrent deposits, balance ${} (expected ${expected})", wallet.balance);
    println!(
        "  Wallet rows: {} spot, {} futures",
        engine.spot_wallet_count(),
        engine.futures_wallet_count()
    );
    println!("  Journal events: {}\n", engine.event_count());
    Ok(())
}

/// A dead price source surfaces as a retryable 503 and changes nothing.
async fn scenario_6_oracle_outage(config: &LedgerConfig) -> SimResult {
    println!("Scenario 6: Oracle Outage\n");

    let mut config = config.clone();
    config.oracle.timeout_ms = 200;
    config.oracle.max_retries = 1;
    config.oracle.retry_backoff_ms = 10;
    config.oracle.cache_ttl_secs = 0;

    let oracle = Arc::new(market());
    let engine = engine_for(&config, oracle.clone())?;
    let erin = UserId(5);

    let opened = engine.open_position(
        erin,
        OpenPosition {
            symbol: "SOL".into(),
            side: Side::Short,
            margin: Quote::new(dec!(500)),
            leverage: Leverage::new(5).ok_or("leverage")?,
            entry_price: Price::new_unchecked(dec!(100)),
        },
    )?;
    println!("  Erin shorts SOL @ $100 with $500 at 5x");

    oracle.set_delay(Some(Duration::from_millis(500)));
    let cmd = ClosePosition {
        position_id: opened.id,
        price: None,
    };
    match engine.close_position(erin, cmd.clone()).await {
        Err(err) => println!(
            "  Close with slow oracle: {} {} (retryable: {})",
            err.status_code(),
            err.public_message(),
            err.is_retryable()
        ),
        Ok(closed) => println!("  Unexpected close at ${}", closed.closed_price),
    }
    println!("  Still open: {}", engine.get_open_positions(erin)?.len());

    oracle.set_delay(None);
    oracle.set_price("solana", dec!(90));
    let closed = engine.close_position(erin, cmd).await?;
    println!("  Oracle back, closed @ ${}: pnl ${}, wallet ${}", closed.closed_price, closed.pnl, closed.wallet_balance);
    Ok(())
}
