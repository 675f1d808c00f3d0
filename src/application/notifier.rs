use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::application::ports::{AlertStorePort, BotNotifierPort, ChartLinkProvider, DashboardPort};
use crate::application::signal_bus::SignalSubscriber;
use crate::domain::signal::{Alert, Signal};

/// Formats and fans a confirmed [`Signal`] out to the bot, the dashboard, and
/// the alert store. Each leg's failure is logged and isolated from the
/// others; a notifier never returns an error for a partial delivery, only
/// for a shape it cannot recover from at all.
pub struct NotifierSubscriber<B, D, S, C> {
    bot: B,
    dashboard: D,
    store: S,
    chart_link: C,
    region: Option<String>,
}

impl<B, D, S, C> NotifierSubscriber<B, D, S, C>
where
    B: BotNotifierPort,
    D: DashboardPort,
    S: AlertStorePort,
    C: ChartLinkProvider,
{
    pub fn new(bot: B, dashboard: D, store: S, chart_link: C, region: Option<String>) -> Self {
        Self { bot, dashboard, store, chart_link, region }
    }
}

#[async_trait]
impl<B, D, S, C> SignalSubscriber for NotifierSubscriber<B, D, S, C>
where
    B: BotNotifierPort,
    D: DashboardPort,
    S: AlertStorePort,
    C: ChartLinkProvider,
{
    fn name(&self) -> &str {
        "notifier"
    }

    async fn on_signal(&self, signal: &Signal) -> anyhow::Result<()> {
        let chart_link = self.chart_link.link(&signal.symbol, signal.timeframe);
        let message = format_message(signal, &chart_link);

        if let Err(err) = self.bot.send_message(&message).await {
            warn!(%err, "bot notification failed, continuing with other delivery legs");
        } else {
            info!(symbol = %signal.symbol, timeframe = %signal.timeframe, "alert sent to bot");
        }

        let alert = Alert::from_signal(signal, chart_link, self.region.clone());

        if let Err(err) = self.dashboard.broadcast_alert(&alert).await {
            warn!(%err, "dashboard broadcast failed");
        }

        if let Err(err) = self.store.insert(alert).await {
            error!(%err, "failed to persist alert record");
            return Err(err);
        }

        Ok(())
    }
}

/// Price-precision ladder carried over verbatim: <0.001 -> 8 decimals,
/// <0.01 -> 6, <1 -> 4, <100 -> 3, else thousands-grouped 2.
fn format_price(price: Decimal) -> String {
    if price.is_zero() {
        return "N/A".to_string();
    }
    let abs = price.abs();
    if abs < Decimal::new(1, 3) {
        format!("${price:.8}")
    } else if abs < Decimal::new(1, 2) {
        format!("${price:.6}")
    } else if abs < Decimal::ONE {
        format!("${price:.4}")
    } else if abs < Decimal::ONE_HUNDRED {
        format!("${price:.3}")
    } else {
        format_thousands(price)
    }
}

fn format_thousands(price: Decimal) -> String {
    let rounded = price.round_dp(2);
    let negative = rounded.is_sign_negative();
    let magnitude = rounded.abs();
    let whole = magnitude.trunc();
    let frac = (magnitude.fract() * Decimal::ONE_HUNDRED).round();

    let whole_digits = whole.to_string();
    let mut grouped = String::new();
    for (i, ch) in whole_digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let grouped: String = grouped.chars().rev().collect();

    format!("${}{}.{:0>2}", if negative { "-" } else { "" }, grouped, frac)
}

fn format_message(signal: &Signal, chart_link: &str) -> String {
    format!(
        "CHoCH SIGNAL DETECTED\n\n\
         Time: {}\n\
         Symbol: {}\n\
         Timeframe: {}\n\
         Direction: {}\n\
         Group: {:?}\n\
         Price: {}\n\n\
         Chart: {}",
        signal.timestamp.to_rfc3339(),
        signal.symbol,
        signal.timeframe,
        signal.direction,
        signal.pattern_group,
        format_price(signal.choch_price),
        chart_link,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Timeframe;
    use crate::domain::pattern::PatternGroup;
    use crate::domain::signal::SignalDirection;
    use anyhow::Result;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MockBot {
        sent: Arc<AtomicUsize>,
    }
    #[async_trait]
    impl BotNotifierPort for MockBot {
        async fn send_message(&self, _text: &str) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingBot;
    #[async_trait]
    impl BotNotifierPort for FailingBot {
        async fn send_message(&self, _text: &str) -> Result<()> {
            anyhow::bail!("telegram unreachable")
        }
    }

    struct MockDashboard;
    #[async_trait]
    impl DashboardPort for MockDashboard {
        async fn broadcast_alert(&self, _alert: &Alert) -> Result<()> {
            Ok(())
        }
        async fn replay(&self, _limit: usize) -> Result<Vec<Alert>> {
            Ok(vec![])
        }
    }

    struct MockStore {
        inserted: Arc<AtomicUsize>,
    }
    #[async_trait]
    impl AlertStorePort for MockStore {
        async fn insert(&self, mut alert: Alert) -> Result<Alert> {
            self.inserted.fetch_add(1, Ordering::SeqCst);
            alert.id = Some(1);
            Ok(alert)
        }
        async fn recent(&self, _limit: usize) -> Result<Vec<Alert>> {
            Ok(vec![])
        }
        async fn filter(
            &self,
            _symbol: Option<&str>,
            _timeframe: Option<Timeframe>,
            _direction: Option<SignalDirection>,
            _signal_type: Option<&str>,
        ) -> Result<Vec<Alert>> {
            Ok(vec![])
        }
    }

    struct FixedChartLink;
    impl ChartLinkProvider for FixedChartLink {
        fn link(&self, symbol: &str, timeframe: Timeframe) -> String {
            format!("https://charts.example/{symbol}/{timeframe}")
        }
    }

    fn sample_signal() -> Signal {
        Signal {
            symbol: "BTCUSDT".into(),
            timeframe: Timeframe::parse("15m").unwrap(),
            direction: SignalDirection::Long,
            pattern_group: PatternGroup::G1,
            choch_price: dec!(27123.456),
            entry1_price: dec!(27000),
            entry2_price: dec!(26950),
            tp_price: dec!(27500),
            sl_price: dec!(26800),
            pivot5: dec!(27500),
            pivot6: dec!(27200),
            pivot8: dec!(27300),
            timestamp: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn delivers_to_bot_dashboard_and_store() {
        let sent = Arc::new(AtomicUsize::new(0));
        let inserted = Arc::new(AtomicUsize::new(0));
        let notifier = NotifierSubscriber::new(
            MockBot { sent: sent.clone() },
            MockDashboard,
            MockStore { inserted: inserted.clone() },
            FixedChartLink,
            Some("in".into()),
        );
        notifier.on_signal(&sample_signal()).await.unwrap();
        assert_eq!(sent.load(Ordering::SeqCst), 1);
        assert_eq!(inserted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bot_failure_does_not_prevent_persistence() {
        let inserted = Arc::new(AtomicUsize::new(0));
        let notifier =
            NotifierSubscriber::new(FailingBot, MockDashboard, MockStore { inserted: inserted.clone() }, FixedChartLink, None);
        let result = notifier.on_signal(&sample_signal()).await;
        assert!(result.is_ok());
        assert_eq!(inserted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn price_formatting_ladder() {
        assert_eq!(format_price(dec!(0)), "N/A");
        assert_eq!(format_price(dec!(0.0005)), "$0.00050000");
        assert_eq!(format_price(dec!(0.005)), "$0.005000");
        assert_eq!(format_price(dec!(0.5)), "$0.5000");
        assert_eq!(format_price(dec!(50.1234)), "$50.123");
        assert_eq!(format_price(dec!(27123.456)), "$27,123.46");
    }
}
