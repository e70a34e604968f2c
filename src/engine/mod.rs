// 8.0: ledger engine. wallet provisioning, spot wallet operations and the
// futures position lifecycle over one shared store, price service and journal.
// every mutation commits atomically on the acting user's rows.

mod core;
mod futures;
mod provisioning;
mod results;
mod spot;

pub use core::Engine;
pub use results::{
    AssetView, BalanceReceipt, BuyReceipt, ClosedPosition, ConvertPreview, ConvertReceipt, EngineError,
    FuturesWalletView, OpenedPosition, Registration, SellReceipt, SpotWalletView,
};
