use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info, warn};

use crate::application::ports::ExchangeDataPort;
use crate::application::scheduler::TimeframeScheduler;
use crate::application::signal_bus::SignalBus;
use crate::domain::choch::{self, PivotVolumes};
use crate::domain::market::{Candle, CandleWindow, Timeframe};
use crate::domain::pattern::{self, PatternState};
use crate::domain::pivot::{PivotAllowList, PivotHistory};
use crate::domain::signal::Signal;

/// Pause between per-symbol fetches within one scan pass, to avoid hammering
/// the exchange port.
const INTER_SYMBOL_YIELD: StdDuration = StdDuration::from_millis(50);
const CANDLES_PER_SCAN: usize = 50;

#[derive(Debug)]
pub enum OrchestratorCommand {
    Shutdown,
    UpdateSymbols(Vec<String>),
}

/// Per-(symbol, timeframe) state the orchestrator owns exclusively; never
/// shared across tasks.
struct PairState {
    window: CandleWindow,
    pivots: PivotHistory,
    pattern: PatternState,
}

impl PairState {
    fn new(pivot_capacity: usize) -> Self {
        Self { window: CandleWindow::new(CANDLES_PER_SCAN), pivots: PivotHistory::new(pivot_capacity), pattern: PatternState::default() }
    }
}

/// The scan loop: a `tokio::select!` over a tick-driven wake and a command
/// channel for dynamic symbol updates and graceful shutdown, running a
/// poll-fetch-recognise-confirm pass over every ready (symbol, timeframe)
/// pair each iteration.
pub struct ScanOrchestrator {
    exchange: Arc<dyn ExchangeDataPort>,
    signal_bus: Arc<SignalBus>,
    scheduler: TimeframeScheduler,
    quote: String,
    min_24h_volume: f64,
    max_pairs: usize,
    pivot_left: usize,
    pivot_right: usize,
    allow_list: PivotAllowList,
    symbols: Vec<String>,
    cmd_rx: Option<Receiver<OrchestratorCommand>>,
    states: HashMap<(String, Timeframe), PairState>,
    pivot_capacity: usize,
    update_interval: StdDuration,
}

impl ScanOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange: Arc<dyn ExchangeDataPort>,
        signal_bus: Arc<SignalBus>,
        timeframes: Vec<Timeframe>,
        quote: String,
        min_24h_volume: f64,
        max_pairs: usize,
        pivot_left: usize,
        pivot_right: usize,
        allow_list: PivotAllowList,
        symbols: Vec<String>,
        cmd_rx: Option<Receiver<OrchestratorCommand>>,
        pivot_capacity: usize,
        update_interval_secs: u64,
    ) -> Self {
        Self {
            exchange,
            signal_bus,
            scheduler: TimeframeScheduler::new(timeframes),
            quote,
            min_24h_volume,
            max_pairs,
            pivot_left,
            pivot_right,
            allow_list,
            symbols,
            cmd_rx,
            states: HashMap::new(),
            pivot_capacity,
            update_interval: StdDuration::from_secs(update_interval_secs.max(1)),
        }
    }

    /// How long to sleep before the next scan attempt: never more often than
    /// `update_interval` (the configured floor between scan iterations), but
    /// no longer than the nearest timeframe close across every configured
    /// timeframe, so a quiet period doesn't idle well past the next close.
    fn next_wake_delay(&self, now: chrono::DateTime<Utc>) -> StdDuration {
        match self.scheduler.nearest_next_close(now) {
            Some(at) if at > now => (at - now).to_std().unwrap_or(self.update_interval).max(self.update_interval),
            _ => self.update_interval,
        }
    }

    pub async fn run(&mut self) {
        loop {
            let delay = self.next_wake_delay(Utc::now());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if let Err(err) = self.maybe_scan().await {
                        error!(%err, "scan pass failed");
                    }
                }
                maybe_cmd = async {
                    if let Some(rx) = &mut self.cmd_rx {
                        rx.recv().await
                    } else {
                        std::future::pending().await
                    }
                } => {
                    match maybe_cmd {
                        Some(OrchestratorCommand::Shutdown) => {
                            info!("orchestrator received shutdown command");
                            return;
                        }
                        Some(OrchestratorCommand::UpdateSymbols(symbols)) => {
                            info!(count = symbols.len(), "orchestrator updating symbol set");
                            self.symbols = symbols;
                        }
                        None => {
                            self.cmd_rx = None;
                        }
                    }
                }
            }
        }
    }

    async fn maybe_scan(&mut self) -> anyhow::Result<()> {
        let now = Utc::now();
        let ready = self.scheduler.get_scannable(now);
        if ready.is_empty() {
            return Ok(());
        }

        let symbols = self.resolve_symbols().await?;

        for timeframe in &ready {
            for symbol in &symbols {
                if let Err(err) = self.scan_pair(symbol, *timeframe).await {
                    warn!(%symbol, %timeframe, %err, "scan of (symbol, timeframe) failed, skipping");
                }
                tokio::time::sleep(INTER_SYMBOL_YIELD).await;
            }
        }

        for timeframe in &ready {
            self.scheduler.mark_scanned(*timeframe, now);
        }
        Ok(())
    }

    async fn resolve_symbols(&self) -> anyhow::Result<Vec<String>> {
        if !self.symbols.is_empty() {
            return Ok(self.symbols.clone());
        }
        self.exchange.list_symbols(&self.quote, self.min_24h_volume, self.max_pairs).await
    }

    async fn scan_pair(&mut self, symbol: &str, timeframe: Timeframe) -> anyhow::Result<()> {
        let candles = self.exchange.fetch_closed_ohlcv(symbol, timeframe, CANDLES_PER_SCAN).await?;
        if candles.is_empty() {
            return Ok(());
        }

        let pivot_capacity = self.pivot_capacity;
        let state = self.states.entry((symbol.to_string(), timeframe)).or_insert_with(|| PairState::new(pivot_capacity));
        state.window.replace(candles);
        let window = state.window.as_slice_vec();
        state.pivots.rebuild(&window, self.pivot_left, self.pivot_right, &self.allow_list);
        state.pattern.reset();

        let pivots = state.pivots.pivots();
        let Some(base_recognised) = pattern::recognise(&pivots, 0) else {
            return Ok(());
        };

        // If the CHoCH bar (the second-to-last candle in the window) equals
        // the newest pivot's bar, that pivot arrived as part of this same
        // scan pass; re-evaluate the pattern one pivot further back and use
        // that pattern/direction instead, per the offset=1 rule.
        let choch_bar_time = window.len().checked_sub(2).and_then(|i| window.get(i)).map(|c| c.close_time);
        let newest_pivot_time = pivots.last().map(|p| p.bar_index);
        let needs_offset = pivots.len() >= 9 && choch_bar_time.is_some() && choch_bar_time == newest_pivot_time;

        let (recognised, offset) = if needs_offset {
            match pattern::recognise(&pivots, 1) {
                Some(shifted) => (shifted, 1),
                None => return Ok(()),
            }
        } else {
            (base_recognised, 0)
        };
        state.pattern.recognised = Some(recognised);

        let Some(p8_candle) = window.iter().rev().find(|c| c.close_time == recognised.p8_bar_index) else {
            debug!(%symbol, %timeframe, "recognised pattern's p8 bar not found in window, skipping");
            return Ok(());
        };

        let Some(volume_set) = pivots_for_volume(&pivots, &window, offset) else {
            return Ok(());
        };

        let Some(choch) = choch::confirm(&mut state.pattern, &window, &recognised, p8_candle, &volume_set) else {
            return Ok(());
        };

        let signal = build_signal(symbol, timeframe, &recognised, &choch, &window)?;
        info!(%symbol, %timeframe, direction = %signal.direction, group = ?signal.pattern_group, "CHoCH signal confirmed");
        self.signal_bus.publish(signal).await;
        Ok(())
    }
}

/// Volumes at pivot bars p4..p8 of the 8-pivot set ending `offset` from the
/// newest pivot, looked up by `bar_index` against `window` (never a FIFO
/// reference, per the redesign flag against cyclic pivot/pattern refs).
fn pivots_for_volume(pivots: &[crate::domain::pivot::Pivot], window: &[Candle], offset: usize) -> Option<PivotVolumes> {
    if pivots.len() < 8 + offset {
        return None;
    }
    let end = pivots.len() - offset;
    let p = &pivots[end - 8..end];
    let volume_at = |bar_index: chrono::DateTime<Utc>| window.iter().find(|c| c.close_time == bar_index).map(|c| c.volume);
    Some(PivotVolumes {
        v4: volume_at(p[3].bar_index)?,
        v5: volume_at(p[4].bar_index)?,
        v6: volume_at(p[5].bar_index)?,
        v7: volume_at(p[6].bar_index)?,
        v8: volume_at(p[7].bar_index)?,
    })
}

fn build_signal(
    symbol: &str,
    timeframe: Timeframe,
    pattern: &pattern::RecognisedPattern,
    choch: &choch::ChochResult,
    window: &[Candle],
) -> anyhow::Result<Signal> {
    use crate::domain::signal::SignalDirection;

    let p8_candle = window
        .iter()
        .find(|c| c.close_time == pattern.p8_bar_index)
        .ok_or_else(|| anyhow::anyhow!("p8 bar {} missing from window when building signal", pattern.p8_bar_index))?;
    let p5_candle = window
        .iter()
        .find(|c| c.close_time == pattern.p5_bar_index)
        .ok_or_else(|| anyhow::anyhow!("p5 bar {} missing from window when building signal", pattern.p5_bar_index))?;
    let p4_candle = window
        .iter()
        .find(|c| c.close_time == pattern.p4_bar_index)
        .ok_or_else(|| anyhow::anyhow!("p4 bar {} missing from window when building signal", pattern.p4_bar_index))?;

    let direction: SignalDirection = choch.direction.into();
    let (entry1_price, entry2_price) = match direction {
        SignalDirection::Long => (p8_candle.low, p8_candle.body_high()),
        SignalDirection::Short => (p8_candle.high, p8_candle.body_low()),
    };
    // TP sits at the pivot-5 bar's body extreme toward the profit side, SL at
    // the pivot-4 bar's body extreme toward the loss side.
    let (tp_price, sl_price) = match direction {
        SignalDirection::Long => (p5_candle.body_high(), p4_candle.body_low()),
        SignalDirection::Short => (p5_candle.body_low(), p4_candle.body_high()),
    };

    Ok(Signal {
        symbol: symbol.to_string(),
        timeframe,
        direction,
        pattern_group: choch.group,
        choch_price: choch.choch_price,
        entry1_price,
        entry2_price,
        tp_price,
        sl_price,
        pivot5: pattern.prices.p5,
        pivot6: pattern.prices.p6,
        pivot8: pattern.prices.p8,
        timestamp: choch.locked_bar_index,
        metadata: serde_json::json!({}),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Candle;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct FixedExchange {
        candles: Vec<Candle>,
    }

    #[async_trait]
    impl ExchangeDataPort for FixedExchange {
        async fn fetch_closed_ohlcv(&self, _symbol: &str, _timeframe: Timeframe, _limit: usize) -> anyhow::Result<Vec<Candle>> {
            Ok(self.candles.clone())
        }

        async fn list_symbols(&self, _quote: &str, _min_24h_volume: f64, _max_count: usize) -> anyhow::Result<Vec<String>> {
            Ok(vec!["BTCUSDT".to_string()])
        }
    }

    fn t(mins: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(mins)
    }

    fn flat_run(count: i64) -> Vec<Candle> {
        (0..count)
            .map(|i| Candle::new(dec!(10), dec!(10.5), dec!(9.5), dec!(10), dec!(1), t(i * 5)).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn empty_fetch_is_skipped_without_error() {
        let exchange = Arc::new(FixedExchange { candles: vec![] });
        let bus = Arc::new(SignalBus::new());
        let mut orchestrator = ScanOrchestrator::new(
            exchange,
            bus,
            vec![Timeframe::parse("15m").unwrap()],
            "USDT".into(),
            0.0,
            0,
            1,
            1,
            PivotAllowList::all_allowed(),
            vec!["BTCUSDT".into()],
            None,
            500,
            1,
        );
        let result = orchestrator.scan_pair("BTCUSDT", Timeframe::parse("15m").unwrap()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn flat_candles_produce_no_pattern_and_no_signal() {
        let exchange = Arc::new(FixedExchange { candles: flat_run(60) });
        let bus = Arc::new(SignalBus::new());
        let mut orchestrator = ScanOrchestrator::new(
            exchange,
            bus.clone(),
            vec![Timeframe::parse("15m").unwrap()],
            "USDT".into(),
            0.0,
            0,
            1,
            1,
            PivotAllowList::all_allowed(),
            vec!["BTCUSDT".into()],
            None,
            500,
            1,
        );
        orchestrator.scan_pair("BTCUSDT", Timeframe::parse("15m").unwrap()).await.unwrap();
        assert_eq!(bus.subscriber_count().await, 0);
    }

    #[test]
    fn volume_lookup_fails_closed_when_bar_missing() {
        let pivots = vec![];
        let window: Vec<Candle> = vec![];
        assert!(pivots_for_volume(&pivots, &window, 0).is_none());
    }
}
