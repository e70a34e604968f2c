// 7.0 config.rs: all settings in one place. futures limits, oracle policy, journal size.
// 7.1 presets: development (empty wallets) and demo (futures wallets start funded).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::types::Leverage;

// Futures account settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuturesConfig {
    // Balance a freshly provisioned futures wallet starts with
    pub starting_balance: Decimal,
    // Highest leverage accepted on open (never above 125)
    pub max_leverage: u32,
}

impl Default for FuturesConfig {
    fn default() -> Self {
        Self {
            starting_balance: Decimal::ZERO,
            max_leverage: Leverage::MAX,
        }
    }
}

// Price oracle policy shared by every engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    // CoinGecko compatible API root
    pub base_url: String,
    // Sent as x-cg-demo-api-key when present
    pub api_key: Option<String>,
    // Upper bound for a single lookup attempt
    pub timeout_ms: u64,
    // Extra attempts after the first failure
    pub max_retries: u32,
    // Pause between attempts
    pub retry_backoff_ms: u64,
    // How long a fetched price is reused (0 disables caching)
    pub cache_ttl_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            api_key: None,
            timeout_ms: 10_000,
            max_retries: 1,
            retry_backoff_ms: 250,
            cache_ttl_secs: 30,
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub environment: Environment,
    pub futures: FuturesConfig,
    pub oracle: OracleConfig,
    // Audit events kept in memory
    pub journal_max_events: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            futures: FuturesConfig::default(),
            oracle: OracleConfig::default(),
            journal_max_events: 100_000,
        }
    }
}

impl LedgerConfig {
    pub fn development() -> Self {
        Self::default()
    }

    // new users get 10k of paper margin to trade futures with
    pub fn demo() -> Self {
        let mut config = Self::default();
        config.environment = Environment::Demo;
        config.futures.starting_balance = dec!(10000);
        config
    }

    /// Load from environment variables, starting from the preset picked by
    /// `PAPERTRADE_ENV` (`development` | `demo`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match env::var("PAPERTRADE_ENV") {
            Ok(v) => v.parse()?,
            Err(_) => Environment::Development,
        };
        let mut config = environment.config();

        if let Some(v) = read_var::<Decimal>("FUTURES_STARTING_BALANCE")? {
            config.futures.starting_balance = v;
        }
        if let Some(v) = read_var::<u32>("FUTURES_MAX_LEVERAGE")? {
            config.futures.max_leverage = v;
        }
        if let Ok(v) = env::var("COINGECKO_BASE_URL") {
            config.oracle.base_url = v;
        }
        if let Ok(v) = env::var("COINGECKO_API_KEY") {
            if !v.is_empty() {
                config.oracle.api_key = Some(v);
            }
        }
        if let Some(v) = read_var::<u64>("ORACLE_TIMEOUT_MS")? {
            config.oracle.timeout_ms = v;
        }
        if let Some(v) = read_var::<u32>("ORACLE_MAX_RETRIES")? {
            config.oracle.max_retries = v;
        }
        if let Some(v) = read_var::<u64>("ORACLE_CACHE_TTL_SECS")? {
            config.oracle.cache_ttl_secs = v;
        }
        if let Some(v) = read_var::<usize>("JOURNAL_MAX_EVENTS")? {
            config.journal_max_events = v;
        }

        config.validate()?;
        Ok(config)
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.futures.starting_balance < Decimal::ZERO {
            return Err(ConfigError::InvalidFutures {
                reason: "starting balance cannot be negative".to_string(),
            });
        }
        if Leverage::new(self.futures.max_leverage).is_none() {
            return Err(ConfigError::InvalidFutures {
                reason: format!(
                    "max leverage must be between {} and {}",
                    Leverage::MIN,
                    Leverage::MAX
                ),
            });
        }
        if self.oracle.timeout_ms == 0 {
            return Err(ConfigError::InvalidOracle {
                reason: "timeout must be above zero".to_string(),
            });
        }
        if self.oracle.base_url.is_empty() {
            return Err(ConfigError::InvalidOracle {
                reason: "base url is required".to_string(),
            });
        }
        if self.journal_max_events == 0 {
            return Err(ConfigError::InvalidJournal);
        }
        Ok(())
    }
}

fn read_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::BadVariable { name, value: raw }),
        Err(_) => Ok(None),
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid futures settings: {reason}")]
    InvalidFutures { reason: String },

    #[error("invalid oracle settings: {reason}")]
    InvalidOracle { reason: String },

    #[error("journal must keep at least one event")]
    InvalidJournal,

    #[error("{name} has an unusable value {value:?}")]
    BadVariable { name: &'static str, value: String },

    #[error("unknown environment {0:?}")]
    UnknownEnvironment(String),
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Demo,
}

impl Environment {
    pub fn config(&self) -> LedgerConfig {
        match self {
            Environment::Development => LedgerConfig::development(),
            Environment::Demo => LedgerConfig::demo(),
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "demo" => Ok(Environment::Demo),
            other => Err(ConfigError::UnknownEnvironment(other.to_string())),
        }
    }
}
