// papertrade-core: ledger and position engine for a paper trading platform.
// spot wallets (fiat + coin holdings) and leveraged futures positions.
// every balance move is exact decimal math committed atomically per user.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: UserId, Side, Price, Quote, Leverage
//   3.x  ledger.rs: contracts, liquidation price, realized pnl, averages
//   4.x  position.rs: futures position row, OPEN -> CLOSED
//   7.x  config.rs: futures limits, oracle policy, env presets
//   8.x  engine/: provisioning, spot engine, futures engine, results
//   9.x  price_feed.rs: oracle trait, CoinGecko adapter, shared policy
//   10.x account.rs: spot and futures wallet rows
//   11.x events.rs: audit journal of committed mutations
//   store.rs: per-user row locks and all-or-nothing transactions
//   api.rs: request payloads and their validation

// core ledger modules
pub mod account;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod position;
pub mod store;
pub mod types;

// integration modules
pub mod api;
pub mod config;
pub mod price_feed;

// re exports for convenience
pub use account::{AccountError, FuturesAccount, SpotAccount, SpotAsset};
pub use engine::*;
pub use events::{Event, EventPayload, Journal};
pub use ledger::MathError;
pub use position::FuturesPosition;
pub use store::{LedgerStore, Provisioned};
pub use types::*;
pub use api::{ClosePosition, Convert, ErrorBody, OpenPosition, ValidationError};
pub use config::{ConfigError, Environment, LedgerConfig};
pub use price_feed::{CoinGeckoOracle, OracleError, PriceOracle, PriceService, StaticPriceOracle};
