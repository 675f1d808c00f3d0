//! End-to-end fan-out: a confirmed signal published on the real `SignalBus`
//! reaches the notifier (bot + dashboard + alert store) and the order
//! manager concurrently, with mock adapters standing in for Binance,
//! Telegram, the dashboard socket and the database.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use choch_scanner::application::notifier::NotifierSubscriber;
use choch_scanner::application::order_manager::{OrderManagerSubscriber, OrderSizing};
use choch_scanner::application::ports::{AlertStorePort, BotNotifierPort, ChartLinkProvider, DashboardPort, OrderExecutionPort};
use choch_scanner::application::signal_bus::SignalBus;
use choch_scanner::domain::market::Timeframe;
use choch_scanner::domain::pattern::PatternGroup;
use choch_scanner::domain::signal::{Alert, Signal, SignalDirection};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;

struct MockBot {
    sent: AtomicUsize,
}

#[async_trait]
impl BotNotifierPort for MockBot {
    async fn send_message(&self, _text: &str) -> anyhow::Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockDashboard {
    broadcasts: Mutex<Vec<Alert>>,
}

#[async_trait]
impl DashboardPort for MockDashboard {
    async fn broadcast_alert(&self, alert: &Alert) -> anyhow::Result<()> {
        self.broadcasts.lock().await.push(alert.clone());
        Ok(())
    }
    async fn replay(&self, limit: usize) -> anyhow::Result<Vec<Alert>> {
        Ok(self.broadcasts.lock().await.iter().rev().take(limit).cloned().collect())
    }
}

struct MockAlertStore {
    stored: Mutex<Vec<Alert>>,
}

#[async_trait]
impl AlertStorePort for MockAlertStore {
    async fn insert(&self, mut alert: Alert) -> anyhow::Result<Alert> {
        alert.id = Some(self.stored.lock().await.len() as i64 + 1);
        self.stored.lock().await.push(alert.clone());
        Ok(alert)
    }
    async fn recent(&self, limit: usize) -> anyhow::Result<Vec<Alert>> {
        Ok(self.stored.lock().await.iter().rev().take(limit).cloned().collect())
    }
    async fn filter(
        &self,
        _symbol: Option<&str>,
        _timeframe: Option<Timeframe>,
        _direction: Option<SignalDirection>,
        _signal_type: Option<&str>,
    ) -> anyhow::Result<Vec<Alert>> {
        Ok(self.stored.lock().await.clone())
    }
}

struct FixedChartLink;

impl ChartLinkProvider for FixedChartLink {
    fn link(&self, symbol: &str, timeframe: Timeframe) -> String {
        format!("https://example/chart/{symbol}/{timeframe}")
    }
}

struct MockExchange {
    mark_price: Decimal,
    orders_placed: AtomicUsize,
}

#[async_trait]
impl OrderExecutionPort for MockExchange {
    async fn place_limit_order(&self, _symbol: &str, _side: SignalDirection, _price: Decimal, _quantity: Decimal) -> anyhow::Result<String> {
        self.orders_placed.fetch_add(1, Ordering::SeqCst);
        Ok("order-1".to_string())
    }
    async fn place_market_close(&self, _symbol: &str, _quantity: Decimal) -> anyhow::Result<String> {
        Ok("close-1".to_string())
    }
    async fn place_tp_sl(&self, _symbol: &str, _side: SignalDirection, _trigger_price: Decimal, _is_take_profit: bool) -> anyhow::Result<String> {
        self.orders_placed.fetch_add(1, Ordering::SeqCst);
        Ok("tpsl-1".to_string())
    }
    async fn cancel_order(&self, _symbol: &str, _exchange_order_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn mark_price(&self, _symbol: &str) -> anyhow::Result<Decimal> {
        Ok(self.mark_price)
    }
    async fn order_status(&self, _symbol: &str, _exchange_order_id: &str) -> anyhow::Result<choch_scanner::domain::signal::OrderStatus> {
        Ok(choch_scanner::domain::signal::OrderStatus::Open)
    }
}

fn sample_signal() -> Signal {
    Signal {
        symbol: "BTCUSDT".into(),
        timeframe: Timeframe::parse("15m").unwrap(),
        direction: SignalDirection::Long,
        pattern_group: PatternGroup::G1,
        choch_price: dec!(100),
        entry1_price: dec!(99),
        entry2_price: dec!(98),
        tp_price: dec!(110),
        sl_price: dec!(95),
        pivot5: dec!(97),
        pivot6: dec!(101),
        pivot8: dec!(105),
        timestamp: Utc::now(),
        metadata: serde_json::json!({}),
    }
}

#[tokio::test]
async fn confirmed_signal_reaches_notifier_and_order_manager() {
    let bot = Arc::new(MockBot { sent: AtomicUsize::new(0) });
    let dashboard = Arc::new(MockDashboard { broadcasts: Mutex::new(Vec::new()) });
    let store = Arc::new(MockAlertStore { stored: Mutex::new(Vec::new()) });
    let exchange = Arc::new(MockExchange { mark_price: dec!(98), orders_placed: AtomicUsize::new(0) });

    let bus = Arc::new(SignalBus::new());

    let notifier = NotifierSubscriber::new(bot.clone(), dashboard.clone(), store.clone(), FixedChartLink, Some("us-east".to_string()));
    bus.subscribe(Arc::new(notifier)).await;

    let order_manager = OrderManagerSubscriber::new(exchange.clone(), OrderSizing { position_size_usdt: dec!(1000), leverage: dec!(1) });
    bus.subscribe(Arc::new(order_manager)).await;

    assert_eq!(bus.subscriber_count().await, 2);

    let report = bus.publish(sample_signal()).await;
    assert_eq!(report.successes, 2);
    assert_eq!(report.failures, 0);

    assert_eq!(bot.sent.load(Ordering::SeqCst), 1);
    assert_eq!(dashboard.broadcasts.lock().await.len(), 1);
    assert_eq!(store.stored.lock().await.len(), 1);
    assert_eq!(store.stored.lock().await[0].region.as_deref(), Some("us-east"));

    // Two limit entries plus TP and SL.
    assert_eq!(exchange.orders_placed.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn signal_bus_isolates_a_failing_subscriber_from_a_healthy_one() {
    let bot = Arc::new(MockBot { sent: AtomicUsize::new(0) });
    let dashboard = Arc::new(MockDashboard { broadcasts: Mutex::new(Vec::new()) });
    let store = Arc::new(MockAlertStore { stored: Mutex::new(Vec::new()) });
    // Mark price already past take-profit: the order manager should skip
    // the signal (not error), while the notifier still delivers.
    let exchange = Arc::new(MockExchange { mark_price: dec!(999), orders_placed: AtomicUsize::new(0) });

    let bus = Arc::new(SignalBus::new());
    bus.subscribe(Arc::new(NotifierSubscriber::new(bot.clone(), dashboard, store.clone(), FixedChartLink, None))).await;
    bus.subscribe(Arc::new(OrderManagerSubscriber::new(exchange.clone(), OrderSizing { position_size_usdt: dec!(1000), leverage: dec!(1) }))).await;

    let report = bus.publish(sample_signal()).await;
    assert_eq!(report.successes, 2);
    assert_eq!(store.stored.lock().await.len(), 1);
    assert_eq!(exchange.orders_placed.load(Ordering::SeqCst), 0);
}
