use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;

use crate::domain::market::Timeframe;

/// Post-close publish-to-availability debounce, applied uniformly across
/// native and synthesised timeframes.
const BUFFER_SECONDS: i64 = 30;

fn unix_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()
}

#[derive(Debug, Default, Clone, Copy)]
struct SchedulerEntry {
    last_scanned_close: Option<DateTime<Utc>>,
}

/// For each configured timeframe, answers whether its most recent
/// closed candle is ready to process. Native timeframes align to the Unix
/// epoch (itself minute-aligned, so this matches clock-boundary alignment
/// for every native interval); synthesised timeframes align to their own
/// fixed reference instant — the same `R` the aligned aggregator uses, so
/// scheduler and aggregator never disagree about period boundaries.
pub struct TimeframeScheduler {
    timeframes: Vec<Timeframe>,
    state: HashMap<Timeframe, SchedulerEntry>,
}

impl TimeframeScheduler {
    pub fn new(timeframes: Vec<Timeframe>) -> Self {
        let state = timeframes.iter().map(|tf| (*tf, SchedulerEntry::default())).collect();
        Self { timeframes, state }
    }

    fn reference(&self, tf: Timeframe) -> DateTime<Utc> {
        tf.reference_instant().unwrap_or_else(unix_epoch)
    }

    /// The greatest instant <= `now` that is the close of a candle of this
    /// timeframe.
    pub fn prev_close(&self, tf: Timeframe, now: DateTime<Utc>) -> DateTime<Utc> {
        let interval_secs = tf.minutes() as i64 * 60;
        let r = self.reference(tf);
        let elapsed_secs = (now - r).num_seconds();
        let period_index = elapsed_secs.div_euclid(interval_secs);
        r + Duration::seconds(period_index * interval_secs)
    }

    pub fn next_close(&self, tf: Timeframe, now: DateTime<Utc>) -> DateTime<Utc> {
        self.prev_close(tf, now) + Duration::minutes(tf.minutes() as i64)
    }

    fn ready_time(&self, tf: Timeframe, now: DateTime<Utc>) -> DateTime<Utc> {
        self.prev_close(tf, now) + Duration::seconds(BUFFER_SECONDS)
    }

    pub fn is_ready(&self, tf: Timeframe, now: DateTime<Utc>) -> bool {
        let prev = self.prev_close(tf, now);
        let ready_time = prev + Duration::seconds(BUFFER_SECONDS);
        let last_scanned = self.state.get(&tf).and_then(|e| e.last_scanned_close);
        now >= ready_time && last_scanned.is_none_or(|l| l < prev)
    }

    /// All timeframes whose `is_ready(now)` is currently true.
    pub fn get_scannable(&self, now: DateTime<Utc>) -> Vec<Timeframe> {
        self.timeframes.iter().copied().filter(|tf| self.is_ready(*tf, now)).collect()
    }

    /// Called by the orchestrator after a successful scan of `prev_close(now)`
    /// for this timeframe, guaranteeing each close is scanned at most once.
    pub fn mark_scanned(&mut self, tf: Timeframe, now: DateTime<Utc>) {
        let prev = self.prev_close(tf, now);
        self.state.entry(tf).or_default().last_scanned_close = Some(prev);
    }

    /// The nearest `next_close` across all configured timeframes, for the
    /// orchestrator to sleep until when nothing is currently scannable.
    pub fn nearest_next_close(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.timeframes.iter().map(|tf| self.next_close(*tf, now) + Duration::seconds(BUFFER_SECONDS)).min()
    }
}
