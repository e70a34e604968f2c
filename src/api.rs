//! Request payloads as they arrive from the HTTP layer, and their validation
//! into typed commands the engine executes.
//!
//! Clients send numbers either as JSON numbers or as strings, so every
//! numeric field is a [`FieldValue`] until it has been checked. Validation
//! never touches ledger state.

use crate::engine::EngineError;
use crate::types::{Leverage, ParseSideError, PositionId, Price, Quote, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(serde_json::Number),
}

impl FieldValue {
    fn as_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.trim().to_string(),
            FieldValue::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<Decimal> for FieldValue {
    fn from(d: Decimal) -> Self {
        FieldValue::Text(d.to_string())
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        FieldValue::Number(n.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{0} must be a number")]
    NotANumber(&'static str),

    #[error("{0} must be positive")]
    NotPositive(&'static str),

    #[error(transparent)]
    Side(#[from] ParseSideError),

    #[error("leverage must be an integer")]
    LeverageNotInteger,

    #[error("leverage must be between {min} and {max}")]
    LeverageOutOfRange { min: u32, max: u32 },

    #[error("cannot convert a coin into itself")]
    SameCoin,
}

fn required_text(field: &'static str, value: &Option<FieldValue>) -> Result<String, ValidationError> {
    match value {
        Some(v) => {
            let text = v.as_text();
            if text.is_empty() {
                Err(ValidationError::Missing(field))
            } else {
                Ok(text)
            }
        }
        None => Err(ValidationError::Missing(field)),
    }
}

pub fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, ValidationError> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| ValidationError::NotANumber(field))
}

fn required_decimal(field: &'static str, value: &Option<FieldValue>) -> Result<Decimal, ValidationError> {
    parse_decimal(field, &required_text(field, value)?)
}

pub fn ensure_positive(field: &'static str, value: Decimal) -> Result<Decimal, ValidationError> {
    if value > Decimal::ZERO {
        Ok(value)
    } else {
        Err(ValidationError::NotPositive(field))
    }
}

fn required_price(field: &'static str, value: &Option<FieldValue>) -> Result<Price, ValidationError> {
    Price::new(required_decimal(field, value)?).ok_or(ValidationError::NotPositive(field))
}

fn required_positive(field: &'static str, value: &Option<FieldValue>) -> Result<Decimal, ValidationError> {
    ensure_positive(field, required_decimal(field, value)?)
}

pub fn parse_leverage(raw: &str, max: u32) -> Result<Leverage, ValidationError> {
    let value: i64 = raw.trim().parse().map_err(|_| ValidationError::LeverageNotInteger)?;
    let max = max.min(Leverage::MAX);
    u32::try_from(value)
        .ok()
        .filter(|v| *v <= max)
        .and_then(Leverage::new)
        .ok_or(ValidationError::LeverageOutOfRange { min: Leverage::MIN, max })
}

// 1: futures

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenPositionRequest {
    pub symbol: Option<FieldValue>,
    pub side: Option<FieldValue>,
    pub margin: Option<FieldValue>,
    pub leverage: Option<FieldValue>,
    pub price: Option<FieldValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub symbol: String,
    pub side: Side,
    pub margin: Quote,
    pub leverage: Leverage,
    pub entry_price: Price,
}

impl OpenPositionRequest {
    pub fn validate(&self, max_leverage: u32) -> Result<OpenPosition, ValidationError> {
        let symbol = required_text("symbol", &self.symbol)?;
        let side_raw = required_text("side", &self.side)?;
        let margin_raw = required_text("margin", &self.margin)?;
        let leverage_raw = required_text("leverage", &self.leverage)?;
        let price_raw = required_text("price", &self.price)?;

        let side: Side = side_raw.parse()?;
        let leverage = parse_leverage(&leverage_raw, max_leverage)?;
        let margin = ensure_positive("margin", parse_decimal("margin", &margin_raw)?)?;
        let entry_price = Price::new(parse_decimal("price", &price_raw)?)
            .ok_or(ValidationError::NotPositive("price"))?;

        Ok(OpenPosition {
            symbol: symbol.to_uppercase(),
            side,
            margin: Quote::new(margin),
            leverage,
            entry_price,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClosePositionRequest {
    pub price: Option<FieldValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosePosition {
    pub position_id: PositionId,
    pub price: Option<Price>,
}

impl ClosePositionRequest {
    pub fn validate(&self, position_id: u64) -> Result<ClosePosition, ValidationError> {
        let price = match &self.price {
            Some(v) if !v.as_text().is_empty() => Some(required_price("price", &self.price)?),
            _ => None,
        };
        Ok(ClosePosition {
            position_id: PositionId(position_id),
            price,
        })
    }
}

// 2: spot

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmountRequest {
    pub amount: Option<FieldValue>,
}

impl AmountRequest {
    pub fn validate(&self) -> Result<Quote, ValidationError> {
        required_positive("amount", &self.amount).map(Quote::new)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuyRequest {
    pub coin_id: Option<FieldValue>,
    pub symbol: Option<FieldValue>,
    pub amount: Option<FieldValue>,
    pub price: Option<FieldValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Buy {
    pub coin_id: String,
    pub symbol: String,
    pub amount_usd: Quote,
    pub price: Price,
}

impl BuyRequest {
    pub fn validate(&self) -> Result<Buy, ValidationError> {
        let coin_id = required_text("coin_id", &self.coin_id)?;
        let symbol = required_text("symbol", &self.symbol)?;
        let amount_usd = required_positive("amount", &self.amount)?;
        let price = required_price("price", &self.price)?;
        Ok(Buy {
            coin_id,
            symbol,
            amount_usd: Quote::new(amount_usd),
            price,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SellRequest {
    pub coin_id: Option<FieldValue>,
    pub amount: Option<FieldValue>,
    pub price: Option<FieldValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sell {
    pub coin_id: String,
    pub amount: Decimal,
    pub price: Price,
}

impl SellRequest {
    pub fn validate(&self) -> Result<Sell, ValidationError> {
        Ok(Sell {
            coin_id: required_text("coin_id", &self.coin_id)?,
            amount: required_positive("amount", &self.amount)?,
            price: required_price("price", &self.price)?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConvertRequest {
    #[serde(alias = "from_id", alias = "from")]
    pub from_coin: Option<FieldValue>,
    #[serde(alias = "to_id", alias = "to")]
    pub to_coin: Option<FieldValue>,
    pub amount: Option<FieldValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Convert {
    pub from_coin: String,
    pub to_coin: String,
    pub amount: Decimal,
}

impl ConvertRequest {
    pub fn validate(&self) -> Result<Convert, ValidationError> {
        let from_coin = required_text("from_coin", &self.from_coin)?;
        let to_coin = required_text("to_coin", &self.to_coin)?;
        let amount = required_positive("amount", &self.amount)?;
        if from_coin == to_coin {
            return Err(ValidationError::SameCoin);
        }
        Ok(Convert {
            from_coin,
            to_coin,
            amount,
        })
    }
}

// 3: responses

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Status code and body for a failed operation. Internal details never leak.
pub fn error_response(err: &EngineError) -> (u16, ErrorBody) {
    (
        err.status_code(),
        ErrorBody {
            error: err.public_message(),
        },
    )
}
