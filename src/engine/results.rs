// 8.0.2: result payloads and the error taxonomy for engine operations.
// decimals serialize as strings so no precision is lost in transit.

use crate::account::AccountError;
use crate::api::ValidationError;
use crate::ledger::MathError;
use crate::position::PositionError;
use crate::price_feed::OracleError;
use crate::store::{Provisioned, StoreError};
use crate::types::{Leverage, PositionId, Price, Quote, Side};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::error;

// futures

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenedPosition {
    pub id: PositionId,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Price,
    pub contracts: Decimal,
    pub leverage: Leverage,
    pub margin_used: Quote,
    pub liquidation_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedPosition {
    pub pnl: Quote,
    pub wallet_balance: Quote,
    pub closed_price: Price,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuturesWalletView {
    pub balance: Quote,
    pub locked_margin: Quote,
    pub open_positions: usize,
}

// spot

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetView {
    pub coin_id: String,
    pub symbol: String,
    pub amount: Decimal,
    pub avg_price: Decimal,
    pub live_price: Decimal, // zero when the oracle has no price
    pub usd_value: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpotWalletView {
    pub balance: Quote,
    pub total_asset_value: Quote,
    pub assets: Vec<AssetView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceReceipt {
    pub amount: Quote,
    pub balance: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyReceipt {
    pub coin_id: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub holding: Decimal,
    pub avg_price: Decimal,
    pub balance: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SellReceipt {
    pub coin_id: String,
    pub returned: Quote,
    pub remaining: Decimal,
    pub balance: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertReceipt {
    pub from_coin: String,
    pub to_coin: String,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub usd_value: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertPreview {
    pub from_coin: String,
    pub to_coin: String,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub to_symbol: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub spot: Provisioned,
    pub futures: Provisioned,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InsufficientFunds(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Price unavailable: {0}")]
    OracleUnavailable(OracleError),

    #[error("Internal inconsistency: {0}")]
    Internal(String),
}

impl EngineError {
    pub(crate) fn internal(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        error!(detail = %detail, "internal ledger inconsistency");
        EngineError::Internal(detail)
    }

    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Validation(_) | EngineError::InsufficientFunds(_) => 400,
            EngineError::NotFound(_) => 404,
            EngineError::OracleUnavailable(_) => 503,
            EngineError::Internal(_) => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::OracleUnavailable(_))
    }

    /// Message safe to hand to a client.
    pub fn public_message(&self) -> String {
        match self {
            EngineError::OracleUnavailable(OracleError::Missing(id)) => {
                format!("Price data unavailable for {id}")
            }
            EngineError::OracleUnavailable(_) => "Price service unavailable, try again later".to_string(),
            EngineError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

impl From<OracleError> for EngineError {
    fn from(err: OracleError) -> Self {
        EngineError::OracleUnavailable(err)
    }
}

impl From<MathError> for EngineError {
    fn from(err: MathError) -> Self {
        EngineError::internal(err.to_string())
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::internal(err.to_string())
    }
}

impl From<AccountError> for EngineError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InsufficientBalance { .. } | AccountError::InsufficientHoldings { .. } => {
                EngineError::InsufficientFunds(err.to_string())
            }
            AccountError::AssetNotFound(_) => EngineError::NotFound(err.to_string()),
            // a closed position is not open, so callers see the same answer
            AccountError::PositionNotFound(id) | AccountError::PositionClosed(id) => {
                EngineError::NotFound(format!("Open position {id} not found"))
            }
            AccountError::Math(e) => e.into(),
        }
    }
}

impl From<PositionError> for EngineError {
    fn from(err: PositionError) -> Self {
        AccountError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_classes() {
        assert_eq!(EngineError::Validation("x".into()).status_code(), 400);
        assert_eq!(EngineError::InsufficientFunds("x".into()).status_code(), 400);
        assert_eq!(EngineError::NotFound("x".into()).status_code(), 404);
        assert_eq!(EngineError::OracleUnavailable(OracleError::Down).status_code(), 503);
        assert_eq!(EngineError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn only_oracle_failures_retry() {
        assert!(EngineError::OracleUnavailable(OracleError::Down).is_retryable());
        assert!(!EngineError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn internal_details_do_not_leak() {
        let err: EngineError = MathError::Overflow("contracts").into();
        assert!(matches!(err, EngineError::Internal(_)));
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn account_errors_map_to_taxonomy() {
        let funds: EngineError = AccountError::InsufficientBalance {
            requested: Quote::new(dec!(10)),
            available: Quote::new(dec!(5)),
        }
        .into();
        assert!(matches!(funds, EngineError::InsufficientFunds(_)));

        let closed: EngineError = AccountError::PositionClosed(PositionId(3)).into();
        assert_eq!(closed, EngineError::NotFound("Open position 3 not found".to_string()));

        let missing: EngineError = AccountError::AssetNotFound("solana".into()).into();
        assert_eq!(missing.status_code(), 404);
    }

    #[test]
    fn validation_message_passes_through() {
        let err: EngineError = ValidationError::Missing("price").into();
        assert_eq!(err.public_message(), "price is required");
    }

    #[test]
    fn payload_decimals_are_strings() {
        let closed = ClosedPosition {
            pnl: Quote::new(dec!(1000)),
            wallet_balance: Quote::new(dec!(11000)),
            closed_price: Price::new_unchecked(dec!(33000)),
        };
        let json = serde_json::to_value(&closed).unwrap();
        assert_eq!(json["pnl"], "1000");
        assert_eq!(json["wallet_balance"], "11000");
        assert_eq!(json["closed_price"], "33000");
    }
}
