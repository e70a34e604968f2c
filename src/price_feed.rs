// Price Oracle Adapter
//
// The ledger only ever asks one question of the outside world: what is this
// coin worth in USD right now. Everything that answers it implements
// `PriceOracle`. `PriceService` wraps any adapter with the single timeout,
// retry and caching policy both engines share.

use crate::config::OracleConfig;
use crate::types::Price;
use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("price lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("price source unreachable: {0}")]
    Transport(String),

    #[error("price source returned status {0}")]
    Status(u16),

    #[error("price source sent an unreadable payload: {0}")]
    Malformed(String),

    #[error("no price available for {0}")]
    Missing(String),

    #[error("price source is down")]
    Down,
}

/// Trait for price sources. `get_prices` may return a partial map; ids it
/// could not price are simply absent.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn get_prices(&self, ids: &[String]) -> Result<HashMap<String, Price>, OracleError>;

    async fn get_price(&self, id: &str) -> Result<Price, OracleError> {
        let ids = [id.to_string()];
        let mut prices = self.get_prices(&ids).await?;
        prices
            .remove(id)
            .ok_or_else(|| OracleError::Missing(id.to_string()))
    }
}

/// Fixed prices held in memory. Used by tests and the simulation binary.
#[derive(Debug)]
pub struct StaticPriceOracle {
    prices: RwLock<HashMap<String, Price>>,
    healthy: RwLock<bool>,
    delay: RwLock<Option<Duration>>,
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            healthy: RwLock::new(true),
            delay: RwLock::new(None),
        }
    }

    pub fn with_price(self, id: &str, price: Decimal) -> Self {
        self.set_price(id, price);
        self
    }

    pub fn set_price(&self, id: &str, price: Decimal) {
        if let Some(p) = Price::new(price) {
            self.prices.write().insert(id.to_string(), p);
        }
    }

    pub fn remove_price(&self, id: &str) {
        self.prices.write().remove(id);
    }

    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.write() = healthy;
    }

    // simulates a slow upstream
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write() = delay;
    }
}

impl Default for StaticPriceOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    fn name(&self) -> &str {
        "static"
    }

    async fn get_prices(&self, ids: &[String]) -> Result<HashMap<String, Price>, OracleError> {
        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !*self.healthy.read() {
            return Err(OracleError::Down);
        }
        let prices = self.prices.read();
        Ok(ids
            .iter()
            .filter_map(|id| prices.get(id).map(|p| (id.clone(), *p)))
            .collect())
    }
}

// 9.1: CoinGecko /simple/price. batch lookup keyed by coin id.
pub struct CoinGeckoOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

// futures symbols arrive as BTC, BTCUSDT or btc-usdt. only the futures close path calls this;
// spot coin ids such as `true-usd` go to the oracle untouched.
pub fn resolve_coin_id(key: &str) -> String {
    let lower = key.trim().to_lowercase();
    let base = ["-usdt", "/usdt", "usdt", "-usd", "/usd"]
        .iter()
        .find_map(|suffix| lower.strip_suffix(suffix).filter(|b| !b.is_empty()))
        .unwrap_or(lower.as_str());

    match base {
        "btc" => "bitcoin",
        "eth" => "ethereum",
        "sol" => "solana",
        "xrp" => "ripple",
        "ada" => "cardano",
        "bnb" => "binancecoin",
        "dot" => "polkadot",
        "matic" => "matic-network",
        "doge" => "dogecoin",
        other => other,
    }
    .to_string()
}

// ids are sent verbatim; the response is keyed by the same id.
fn query_ids(ids: &[String]) -> String {
    let mut unique: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
    unique.sort_unstable();
    unique.dedup();
    unique.join(",")
}

fn decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

#[async_trait]
impl PriceOracle for CoinGeckoOracle {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn get_prices(&self, ids: &[String]) -> Result<HashMap<String, Price>, OracleError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut request = self
            .client
            .get(format!("{}/simple/price", self.base_url))
            .query(&[("ids", query_ids(ids)), ("vs_currencies", "usd".to_string())]);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(OracleError::Status(response.status().as_u16()));
        }
        let body: HashMap<String, HashMap<String, serde_json::Value>> = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        Ok(ids
            .iter()
            .filter_map(|id| {
                let usd = body.get(id)?.get("usd")?;
                let price = Price::new(decimal_from_json(usd)?)?;
                Some((id.clone(), price))
            })
            .collect())
    }
}

// 9.2: the shared policy. every lookup is bounded by a timeout, retried a few
// times, and served from a short TTL cache when fresh.
pub struct PriceService {
    inner: Arc<dyn PriceOracle>,
    timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    cache_ttl: Duration,
    cache: RwLock<HashMap<String, (Price, Instant)>>,
}

impl PriceService {
    pub fn new(inner: Arc<dyn PriceOracle>, config: &OracleConfig) -> Self {
        Self {
            inner,
            timeout: config.timeout(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn invalidate(&self) {
        self.cache.write().clear();
    }

    fn cached(&self, ids: &[String]) -> (HashMap<String, Price>, Vec<String>) {
        let cache = self.cache.read();
        let mut hits = HashMap::new();
        let mut misses = Vec::new();
        for id in ids {
            match cache.get(id) {
                Some((price, at)) if !self.cache_ttl.is_zero() && at.elapsed() < self.cache_ttl => {
                    hits.insert(id.clone(), *price);
                }
                _ => misses.push(id.clone()),
            }
        }
        (hits, misses)
    }

    async fn fetch_with_retry(&self, ids: &[String]) -> Result<HashMap<String, Price>, OracleError> {
        let mut last_err = OracleError::Down;
        for attempt in 0..=self.max_retries {
            if attempt > 0 && !self.retry_backoff.is_zero() {
                tokio::time::sleep(self.retry_backoff).await;
            }
            match tokio::time::timeout(self.timeout, self.inner.get_prices(ids)).await {
                Ok(Ok(prices)) => return Ok(prices),
                Ok(Err(e)) => last_err = e,
                Err(_) => last_err = OracleError::Timeout(self.timeout),
            }
            warn!(
                oracle = self.inner.name(),
                attempt = attempt + 1,
                error = %last_err,
                "price lookup failed"
            );
        }
        Err(last_err)
    }
}

#[async_trait]
impl PriceOracle for PriceService {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get_prices(&self, ids: &[String]) -> Result<HashMap<String, Price>, OracleError> {
        let mut wanted: Vec<String> = ids.to_vec();
        wanted.sort_unstable();
        wanted.dedup();

        let (mut prices, misses) = self.cached(&wanted);
        if misses.is_empty() {
            debug!(count = prices.len(), "prices served from cache");
            return Ok(prices);
        }

        let fetched = self.fetch_with_retry(&misses).await?;
        if !self.cache_ttl.is_zero() {
            let now = Instant::now();
            let mut cache = self.cache.write();
            for (id, price) in &fetched {
                cache.insert(id.clone(), (*price, now));
            }
        }
        prices.extend(fetched);
        Ok(prices)
    }
}
