use std::str::FromStr;
use std::sync::RwLock as StdRwLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use crate::application::aggregator::AlignedAggregator;
use crate::application::ports::ExchangeDataPort;
use crate::domain::market::{Candle, Timeframe};
use crate::infrastructure::core::{CircuitBreaker, CircuitBreakerError, HttpClientFactory, build_url_with_query};

const ASSETS_CACHE_TTL: Duration = Duration::from_secs(3600);
/// Binance USD-M futures base-candle interval used to synthesise any
/// timeframe not natively served by `/fapi/v1/klines`.
const SYNTHETIC_BASE_MINUTES: u32 = 5;

/// Majors always monitored alongside the volume-ranked selection, carried
/// over from the original bot's `FIXED_COINS` list.
const FIXED_COINS: [&str; 3] = ["BTCUSDT", "ETHUSDT", "BNBUSDT"];

/// Binance USD-M futures REST client: historical candles (native klines or
/// synthesised from 5m base candles), symbol discovery by quote asset and
/// 24h volume, and (via [`super::orders`]) authenticated order placement.
pub struct BinanceFuturesClient {
    pub(super) client: ClientWithMiddleware,
    pub(super) base_url: String,
    pub(super) api_key: String,
    pub(super) api_secret: String,
    pub(super) circuit_breaker: CircuitBreaker,
    assets_cache: StdRwLock<Option<(Vec<String>, Instant)>>,
}

impl BinanceFuturesClient {
    pub fn builder() -> BinanceFuturesClientBuilder {
        BinanceFuturesClientBuilder::default()
    }
}

#[derive(Default)]
pub struct BinanceFuturesClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    api_secret: Option<String>,
}

impl BinanceFuturesClientBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn api_secret(mut self, api_secret: impl Into<String>) -> Self {
        self.api_secret = Some(api_secret.into());
        self
    }

    pub fn build(self) -> BinanceFuturesClient {
        BinanceFuturesClient {
            client: HttpClientFactory::create_client(),
            base_url: self.base_url.unwrap_or_else(|| "https://fapi.binance.com".to_string()),
            api_key: self.api_key.unwrap_or_default(),
            api_secret: self.api_secret.unwrap_or_default(),
            circuit_breaker: CircuitBreaker::new("BinanceFuturesClient", 5, 3, Duration::from_secs(60)),
            assets_cache: StdRwLock::new(None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    status: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct Ticker24hr {
    symbol: String,
    #[serde(rename = "quoteVolume")]
    quote_volume: String,
}

impl BinanceFuturesClient {
    fn map_circuit_err(err: CircuitBreakerError<anyhow::Error>) -> anyhow::Error {
        match err {
            CircuitBreakerError::Open(msg) => anyhow::anyhow!("Binance circuit breaker open: {msg}"),
            CircuitBreakerError::Inner(inner) => inner,
        }
    }

    async fn fetch_klines(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        self.circuit_breaker
            .call(async {
                let url = format!("{}/fapi/v1/klines", self.base_url);
                let limit_str = limit.to_string();
                let url = build_url_with_query(&url, &[("symbol", symbol), ("interval", interval), ("limit", &limit_str)]);

                let response = self.client.get(&url).send().await.context("failed to fetch klines from Binance")?;
                if !response.status().is_success() {
                    let body = response.text().await.unwrap_or_default();
                    anyhow::bail!("Binance klines fetch failed: {body}");
                }

                // Binance kline rows are plain JSON arrays: [open_time, open, high,
                // low, close, volume, close_time, ...more fields we don't need].
                let raw: Vec<serde_json::Value> = response.json().await.context("failed to parse Binance klines response")?;
                let now = Utc::now();
                let mut candles = Vec::with_capacity(raw.len());
                for entry in raw {
                    let Some(fields) = entry.as_array() else { continue };
                    if fields.len() < 7 {
                        continue;
                    }
                    let Some(close_time_ms) = fields[6].as_i64() else { continue };
                    let Some(close_time) = Utc.timestamp_millis_opt(close_time_ms).single() else { continue };
                    if close_time > now {
                        continue; // still-forming candle, not closed yet
                    }
                    let open = parse_price(&fields[1])?;
                    let high = parse_price(&fields[2])?;
                    let low = parse_price(&fields[3])?;
                    let close = parse_price(&fields[4])?;
                    let volume = parse_price(&fields[5])?;
                    match Candle::new(open, high, low, close, volume, close_time) {
                        Ok(candle) => candles.push(candle),
                        Err(err) => warn!(%symbol, %err, "Binance kline failed OHLC validation, dropping bar"),
                    }
                }
                Ok(candles)
            })
            .await
            .map_err(Self::map_circuit_err)
    }
}

fn parse_price(value: &serde_json::Value) -> Result<Decimal> {
    let s = value.as_str().context("kline field is not a string")?;
    Decimal::from_str(s).with_context(|| format!("kline field '{s}' is not a valid decimal"))
}

#[async_trait]
impl ExchangeDataPort for BinanceFuturesClient {
    async fn fetch_closed_ohlcv(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        if timeframe.is_native() {
            return self.fetch_klines(symbol, &timeframe.label(), limit).await;
        }

        let multiple = (timeframe.minutes() / SYNTHETIC_BASE_MINUTES) as usize;
        let base_limit = limit.saturating_mul(multiple) + multiple;
        let base = self.fetch_klines(symbol, "5m", base_limit).await?;
        let mut aggregated = AlignedAggregator::aggregate(&base, timeframe)?;
        if aggregated.len() > limit {
            aggregated.drain(0..aggregated.len() - limit);
        }
        Ok(aggregated)
    }

    async fn list_symbols(&self, quote: &str, min_24h_volume: f64, max_count: usize) -> Result<Vec<String>> {
        let tradable = self.tradable_symbols(quote).await?;

        self.circuit_breaker
            .call(async {
                let url = format!("{}/fapi/v1/ticker/24hr", self.base_url);
                let response = self.client.get(&url).send().await.context("failed to fetch 24hr ticker from Binance")?;
                if !response.status().is_success() {
                    let body = response.text().await.unwrap_or_default();
                    anyhow::bail!("Binance 24hr ticker fetch failed: {body}");
                }
                let tickers: Vec<Ticker24hr> = response.json().await.context("failed to parse Binance 24hr ticker response")?;

                let mut candidates: Vec<(String, f64)> = tickers
                    .into_iter()
                    .filter(|t| tradable.contains(&t.symbol))
                    .filter_map(|t| t.quote_volume.parse::<f64>().ok().map(|v| (t.symbol, v)))
                    .filter(|(_, volume)| *volume >= min_24h_volume)
                    .collect();

                candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

                // Fixed majors always lead the list (if tradable for this quote),
                // followed by the volume-ranked remainder with duplicates dropped.
                let mut symbols: Vec<String> = FIXED_COINS
                    .iter()
                    .map(|s| s.to_string())
                    .filter(|s| s.ends_with(quote) && tradable.contains(s))
                    .collect();
                for (symbol, _) in candidates {
                    if !symbols.contains(&symbol) {
                        symbols.push(symbol);
                    }
                }
                if max_count > 0 {
                    symbols.truncate(max_count);
                }
                info!(count = symbols.len(), %quote, "resolved tradable symbol set");
                Ok(symbols)
            })
            .await
            .map_err(Self::map_circuit_err)
    }
}

impl BinanceFuturesClient {
    async fn tradable_symbols(&self, quote: &str) -> Result<Vec<String>> {
        {
            let cache = self.assets_cache.read().map_err(|e| anyhow::anyhow!("assets cache poisoned: {e}"))?;
            if let Some((symbols, cached_at)) = cache.as_ref()
                && cached_at.elapsed() < ASSETS_CACHE_TTL
            {
                return Ok(symbols.clone());
            }
        }

        let symbols = self
            .circuit_breaker
            .call(async {
                let url = format!("{}/fapi/v1/exchangeInfo", self.base_url);
                let response = self.client.get(&url).send().await.context("failed to fetch exchangeInfo from Binance")?;
                if !response.status().is_success() {
                    let body = response.text().await.unwrap_or_default();
                    anyhow::bail!("Binance exchangeInfo fetch failed: {body}");
                }
                let info: ExchangeInfo = response.json().await.context("failed to parse Binance exchangeInfo")?;
                Ok(info
                    .symbols
                    .into_iter()
                    .filter(|s| s.status == "TRADING" && s.quote_asset == quote)
                    .map(|s| s.symbol)
                    .collect::<Vec<String>>())
            })
            .await
            .map_err(Self::map_circuit_err)?;

        let mut cache = self.assets_cache.write().map_err(|e| anyhow::anyhow!("assets cache poisoned: {e}"))?;
        *cache = Some((symbols.clone(), Instant::now()));
        Ok(symbols)
    }
}
