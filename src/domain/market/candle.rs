use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::domain::error::ScannerError;

/// A single closed OHLCV bar.
///
/// Invariants (enforced in [`Candle::new`]): `low <= min(open, close)`,
/// `high >= max(open, close)`, `volume >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: DateTime<Utc>,
}

impl Candle {
    pub fn new(
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        close_time: DateTime<Utc>,
    ) -> Result<Self, ScannerError> {
        if low > open.min(close) {
            return Err(ScannerError::DataShape(format!(
                "low {low} exceeds min(open, close) = {}",
                open.min(close)
            )));
        }
        if high < open.max(close) {
            return Err(ScannerError::DataShape(format!(
                "high {high} is below max(open, close) = {}",
                open.max(close)
            )));
        }
        if volume < Decimal::ZERO {
            return Err(ScannerError::DataShape(format!("negative volume {volume}")));
        }
        Ok(Self { open, high, low, close, volume, close_time })
    }

    pub fn body_high(&self) -> Decimal {
        self.open.max(self.close)
    }

    pub fn body_low(&self) -> Decimal {
        self.open.min(self.close)
    }
}

/// Ordered sequence of the N most recent closed candles for a
/// (symbol, timeframe) pair. The currently-forming candle is never held
/// here; the fetcher drops it before the window is filled.
#[derive(Debug, Clone)]
pub struct CandleWindow {
    bars: VecDeque<Candle>,
    capacity: usize,
}

impl CandleWindow {
    pub fn new(capacity: usize) -> Self {
        Self { bars: VecDeque::with_capacity(capacity), capacity }
    }

    /// Timestamp gaps are tolerated; adjacency-dependent logic elsewhere
    /// uses sequence index, not wall-clock offset. Only strict monotonicity
    /// of `close_time` is enforced here.
    pub fn push(&mut self, candle: Candle) -> Result<(), ScannerError> {
        if let Some(last) = self.bars.back() {
            if candle.close_time <= last.close_time {
                return Err(ScannerError::DataShape(format!(
                    "non-monotonic close_time: {} <= {}",
                    candle.close_time, last.close_time
                )));
            }
        }
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(candle);
        Ok(())
    }

    pub fn replace(&mut self, bars: Vec<Candle>) {
        self.bars = bars.into_iter().collect();
        while self.bars.len() > self.capacity {
            self.bars.pop_front();
        }
    }

    pub fn as_slice_vec(&self) -> Vec<Candle> {
        self.bars.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.bars.iter()
    }
}
