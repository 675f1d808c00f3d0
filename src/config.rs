use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

use crate::domain::market::Timeframe;
use crate::domain::pivot::{PivotAllowList, PivotVariant};

/// Everything the scanner needs to run, loaded once at startup from the
/// environment. Every key here is enumerated by the external-interfaces
/// section of the system's design; defaults match the original bot's.
#[derive(Debug, Clone)]
pub struct Config {
    pub symbols: Vec<String>,
    pub fetch_all_coins: bool,
    pub timeframes: Vec<Timeframe>,
    pub pivot_left: usize,
    pub pivot_right: usize,
    pub keep_pivots: usize,
    pub allow_list: PivotAllowListConfig,
    pub historical_limit: usize,
    pub min_volume_24h: f64,
    pub quote_currency: String,
    pub max_pairs: usize,
    pub binance_api_key: String,
    pub binance_api_secret: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub enable_trading: bool,
    pub demo_trading: bool,
    pub position_size: Decimal,
    pub leverage: Decimal,
    pub flask_host: String,
    pub flask_port: u16,
    pub update_interval: u64,
    pub database_url: String,
}

/// The raw per-variant booleans, kept alongside the derived [`PivotAllowList`]
/// so config tests can assert on individual flags without reconstructing it.
#[derive(Debug, Clone, Copy)]
pub struct PivotAllowListConfig {
    pub ph1: bool,
    pub ph2: bool,
    pub ph3: bool,
    pub ph4: bool,
    pub ph5: bool,
    pub pl1: bool,
    pub pl2: bool,
    pub pl3: bool,
    pub pl4: bool,
    pub pl5: bool,
}

impl PivotAllowListConfig {
    pub fn to_allow_list(self) -> PivotAllowList {
        let mut allowed = std::collections::HashSet::new();
        if self.ph1 {
            allowed.insert(PivotVariant::Ph1);
        }
        if self.ph2 {
            allowed.insert(PivotVariant::Ph2);
        }
        if self.ph3 {
            allowed.insert(PivotVariant::Ph3);
        }
        if self.ph4 {
            allowed.insert(PivotVariant::Ph4);
        }
        if self.ph5 {
            allowed.insert(PivotVariant::Ph5);
        }
        if self.pl1 {
            allowed.insert(PivotVariant::Pl1);
        }
        if self.pl2 {
            allowed.insert(PivotVariant::Pl2);
        }
        if self.pl3 {
            allowed.insert(PivotVariant::Pl3);
        }
        if self.pl4 {
            allowed.insert(PivotVariant::Pl4);
        }
        if self.pl5 {
            allowed.insert(PivotVariant::Pl5);
        }
        allowed.insert(PivotVariant::Synthetic);
        PivotAllowList::new(allowed)
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(v) => v.parse::<bool>().with_context(|| format!("failed to parse {key}")),
        Err(_) => Ok(default),
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(v) => v.parse::<T>().with_context(|| format!("failed to parse {key}")),
        Err(_) => Ok(default),
    }
}

fn comma_list(key: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let symbols = comma_list("SYMBOLS");
        let fetch_all_coins = env_bool("FETCH_ALL_COINS", symbols.is_empty())?;

        let timeframes_str = env::var("TIMEFRAMES").unwrap_or_else(|_| "15m".to_string());
        let timeframes: Vec<Timeframe> = timeframes_str
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(Timeframe::parse)
            .collect::<Result<_, _>>()
            .context("failed to parse TIMEFRAMES")?;

        let pivot_left = env_parse("PIVOT_LEFT", 1usize)?;
        let pivot_right = env_parse("PIVOT_RIGHT", 1usize)?;
        let keep_pivots = env_parse("KEEP_PIVOTS", 500usize)?;

        let allow_list = PivotAllowListConfig {
            ph1: env_bool("ALLOW_PH1", true)?,
            ph2: env_bool("ALLOW_PH2", true)?,
            ph3: env_bool("ALLOW_PH3", true)?,
            ph4: env_bool("ALLOW_PH4", true)?,
            ph5: env_bool("ALLOW_PH5", true)?,
            pl1: env_bool("ALLOW_PL1", true)?,
            pl2: env_bool("ALLOW_PL2", true)?,
            pl3: env_bool("ALLOW_PL3", true)?,
            pl4: env_bool("ALLOW_PL4", true)?,
            pl5: env_bool("ALLOW_PL5", true)?,
        };

        let historical_limit = env_parse("HISTORICAL_LIMIT", 500usize)?;
        let min_volume_24h = env_parse("MIN_VOLUME_24H", 1_000_000.0f64)?;
        let quote_currency = env::var("QUOTE_CURRENCY").unwrap_or_else(|_| "USDT".to_string());
        let max_pairs = env_parse("MAX_PAIRS", 0usize)?;

        let binance_api_key = env::var("BINANCE_API_KEY").unwrap_or_default();
        let binance_api_secret = env::var("BINANCE_API_SECRET").unwrap_or_default();

        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        let telegram_chat_id = env::var("TELEGRAM_CHAT_ID").unwrap_or_default();

        let enable_trading = env_bool("ENABLE_TRADING", false)?;
        let demo_trading = env_bool("DEMO_TRADING", true)?;

        let position_size_str = env::var("POSITION_SIZE").unwrap_or_else(|_| "100".to_string());
        let position_size = Decimal::from_str(&position_size_str).context("failed to parse POSITION_SIZE")?;

        let leverage_str = env::var("LEVERAGE").unwrap_or_else(|_| "1".to_string());
        let leverage = Decimal::from_str(&leverage_str).context("failed to parse LEVERAGE")?;

        let flask_host = env::var("FLASK_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let flask_port = env_parse("FLASK_PORT", 5000u16)?;
        let update_interval = env_parse("UPDATE_INTERVAL", 1u64)?;

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://choch_scanner.db".to_string());

        Ok(Self {
            symbols,
            fetch_all_coins,
            timeframes,
            pivot_left,
            pivot_right,
            keep_pivots,
            allow_list,
            historical_limit,
            min_volume_24h,
            quote_currency,
            max_pairs,
            binance_api_key,
            binance_api_secret,
            telegram_bot_token,
            telegram_chat_id,
            enable_trading,
            demo_trading,
            position_size,
            leverage,
            flask_host,
            flask_port,
            update_interval,
            database_url,
        })
    }
}
