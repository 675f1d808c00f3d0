use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::market::{Candle, Timeframe};
use crate::domain::signal::{Alert, OrderStatus};

/// The exchange as an external collaborator. Concrete adapters
/// (e.g. `infrastructure::binance::BinanceFuturesMarketData`) implement this
/// against a real REST API; test doubles implement it in-memory.
#[async_trait]
pub trait ExchangeDataPort: Send + Sync {
    /// At most `limit` closed candles, oldest first. Requesting a
    /// synthesised timeframe routes through the aligned aggregator over
    /// `limit * (m/5)` base 5m bars.
    async fn fetch_closed_ohlcv(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>>;

    /// Ordered set of symbol identifiers, filtered by quote asset and
    /// minimum 24h quote volume; `max_count == 0` means unlimited. Must
    /// include the configured whitelist of majors if reachable.
    async fn list_symbols(&self, quote: &str, min_24h_volume: f64, max_count: usize) -> Result<Vec<String>>;
}

/// The messaging bot as an external collaborator.
#[async_trait]
pub trait BotNotifierPort: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<()>;
}

/// The dashboard's realtime channel, as seen from the notifier. The
/// dashboard's own HTTP framework and HTML are a Non-goal; this is the thin
/// seam the notifier pushes alerts through.
#[async_trait]
pub trait DashboardPort: Send + Sync {
    async fn broadcast_alert(&self, alert: &Alert) -> Result<()>;
    async fn replay(&self, limit: usize) -> Result<Vec<Alert>>;
}

/// Persisted alert storage, shared and tolerant of concurrent appends.
#[async_trait]
pub trait AlertStorePort: Send + Sync {
    async fn insert(&self, alert: Alert) -> Result<Alert>;
    async fn recent(&self, limit: usize) -> Result<Vec<Alert>>;
    async fn filter(
        &self,
        symbol: Option<&str>,
        timeframe: Option<Timeframe>,
        direction: Option<crate::domain::signal::SignalDirection>,
        signal_type: Option<&str>,
    ) -> Result<Vec<Alert>>;
}

/// Non-goal external collaborator (chart-image rendering): produces a link
/// to a chart of the symbol/timeframe for the notifier's message.
pub trait ChartLinkProvider: Send + Sync {
    fn link(&self, symbol: &str, timeframe: Timeframe) -> String;
}

/// Exchange order placement as an external collaborator.
#[async_trait]
pub trait OrderExecutionPort: Send + Sync {
    async fn place_limit_order(&self, symbol: &str, side: crate::domain::signal::SignalDirection, price: Decimal, quantity: Decimal) -> Result<String>;
    async fn place_market_close(&self, symbol: &str, quantity: Decimal) -> Result<String>;
    async fn place_tp_sl(&self, symbol: &str, side: crate::domain::signal::SignalDirection, trigger_price: Decimal, is_take_profit: bool) -> Result<String>;
    async fn cancel_order(&self, symbol: &str, exchange_order_id: &str) -> Result<()>;
    async fn mark_price(&self, symbol: &str) -> Result<Decimal>;
    /// Current status of a previously-placed order, for fill reconciliation.
    async fn order_status(&self, symbol: &str, exchange_order_id: &str) -> Result<OrderStatus>;
}

// Blanket `Arc<T>` passthroughs so a single concrete adapter instance can be
// shared across subscribers that each take their port generically (e.g. the
// order manager) and collaborators that need the same adapter behind a
// `dyn` trait object (e.g. the scan orchestrator's exchange port).
#[async_trait]
impl<T: BotNotifierPort + ?Sized> BotNotifierPort for Arc<T> {
    async fn send_message(&self, text: &str) -> Result<()> {
        (**self).send_message(text).await
    }
}

#[async_trait]
impl<T: DashboardPort + ?Sized> DashboardPort for Arc<T> {
    async fn broadcast_alert(&self, alert: &Alert) -> Result<()> {
        (**self).broadcast_alert(alert).await
    }
    async fn replay(&self, limit: usize) -> Result<Vec<Alert>> {
        (**self).replay(limit).await
    }
}

#[async_trait]
impl<T: AlertStorePort + ?Sized> AlertStorePort for Arc<T> {
    async fn insert(&self, alert: Alert) -> Result<Alert> {
        (**self).insert(alert).await
    }
    async fn recent(&self, limit: usize) -> Result<Vec<Alert>> {
        (**self).recent(limit).await
    }
    async fn filter(
        &self,
        symbol: Option<&str>,
        timeframe: Option<Timeframe>,
        direction: Option<crate::domain::signal::SignalDirection>,
        signal_type: Option<&str>,
    ) -> Result<Vec<Alert>> {
        (**self).filter(symbol, timeframe, direction, signal_type).await
    }
}

#[async_trait]
impl<T: OrderExecutionPort + ?Sized> OrderExecutionPort for Arc<T> {
    async fn place_limit_order(&self, symbol: &str, side: crate::domain::signal::SignalDirection, price: Decimal, quantity: Decimal) -> Result<String> {
        (**self).place_limit_order(symbol, side, price, quantity).await
    }
    async fn place_market_close(&self, symbol: &str, quantity: Decimal) -> Result<String> {
        (**self).place_market_close(symbol, quantity).await
    }
    async fn place_tp_sl(&self, symbol: &str, side: crate::domain::signal::SignalDirection, trigger_price: Decimal, is_take_profit: bool) -> Result<String> {
        (**self).place_tp_sl(symbol, side, trigger_price, is_take_profit).await
    }
    async fn cancel_order(&self, symbol: &str, exchange_order_id: &str) -> Result<()> {
        (**self).cancel_order(symbol, exchange_order_id).await
    }
    async fn mark_price(&self, symbol: &str) -> Result<Decimal> {
        (**self).mark_price(symbol).await
    }
    async fn order_status(&self, symbol: &str, exchange_order_id: &str) -> Result<OrderStatus> {
        (**self).order_status(symbol, exchange_order_id).await
    }
}

impl<T: ChartLinkProvider + ?Sized> ChartLinkProvider for Arc<T> {
    fn link(&self, symbol: &str, timeframe: Timeframe) -> String {
        (**self).link(symbol, timeframe)
    }
}
