use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::error::ScannerError;
use crate::domain::market::{Candle, Timeframe};

/// Synthesises candles for non-native timeframes from a base 5m
/// sequence, aligned to each timeframe's fixed reference instant. The 25m
/// case is load-bearing (1440 minutes/day is not divisible by 25); anchoring
/// to midnight instead of the fixed reference would silently drift across
/// day boundaries, so every period is computed relative to `R`, never to
/// the start of the day.
pub struct AlignedAggregator;

impl AlignedAggregator {
    /// Groups `base` (5m candles, oldest first) into `target`-interval
    /// candles. Only groups with exactly `m/5` constituent base candles are
    /// emitted; partial trailing/leading groups are dropped.
    pub fn aggregate(base: &[Candle], target: Timeframe) -> Result<Vec<Candle>, ScannerError> {
        let minutes = target.minutes() as i64;
        if minutes % 5 != 0 {
            return Err(ScannerError::Config(format!(
                "INVALID_TIMEFRAME: {minutes}m is not a multiple of 5"
            )));
        }
        let reference = target.reference_instant().ok_or_else(|| {
            ScannerError::Config(format!("INVALID_TIMEFRAME: no reference instant configured for {minutes}m"))
        })?;

        let interval_secs = minutes * 60;
        let mut groups: BTreeMap<DateTime<Utc>, Vec<&Candle>> = BTreeMap::new();
        for candle in base {
            let elapsed_secs = (candle.close_time - reference).num_seconds();
            let period_index = elapsed_secs.div_euclid(interval_secs);
            let period_start = reference + Duration::seconds(period_index * interval_secs);
            groups.entry(period_start).or_default().push(candle);
        }

        let expected_members = (minutes / 5) as usize;
        let mut out = Vec::with_capacity(groups.len());
        for (period_start, members) in groups {
            if members.len() != expected_members {
                continue;
            }
            let open = members[0].open;
            let close = members[members.len() - 1].close;
            let high = members.iter().map(|c| c.high).max().expect("non-empty group");
            let low = members.iter().map(|c| c.low).min().expect("non-empty group");
            let volume = members.iter().map(|c| c.volume).sum();
            let close_time = period_start + Duration::minutes(minutes);

            match Candle::new(open, high, low, close, volume, close_time) {
                Ok(candle) => out.push(candle),
                Err(err) => {
                    if cfg!(test) {
                        return Err(err);
                    }
                    warn!(%period_start, %err, "aggregated candle failed OHLC validation, dropping period");
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn base_candle(close_time: DateTime<Utc>, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle::new(open, high, low, close, dec!(1), close_time).unwrap()
    }

    fn five_minute_run(start: DateTime<Utc>, count: i64) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let t = start + Duration::minutes(5 * (i + 1));
                base_candle(t, dec!(10), dec!(11), dec!(9), dec!(10.5))
            })
            .collect()
    }

    /// Seed scenario 1: pure synthetic 25m aggregation.
    #[test]
    fn twenty_five_minute_aggregation_anchors_to_fixed_reference_not_midnight() {
        let start = Utc.with_ymd_and_hms(2025, 10, 24, 0, 0, 0).unwrap();
        let base = five_minute_run(start, 288);
        let tf = Timeframe::parse("25m").unwrap();
        let out = AlignedAggregator::aggregate(&base, tf).unwrap();

        let r = tf.reference_instant().unwrap();
        assert!(!out.is_empty());
        for c in &out {
            let offset = (c.close_time - r).num_minutes();
            assert_eq!(offset.rem_euclid(25), 0);
        }
        assert!(out.iter().any(|c| c.close_time == Utc.with_ymd_and_hms(2025, 10, 24, 17, 30, 0).unwrap()));
    }

    #[test]
    fn completeness_drops_partial_trailing_group() {
        // 7 base candles (one full 25m group of 5, plus a partial 2-candle tail).
        let tf = Timeframe::parse("25m").unwrap();
        let r = tf.reference_instant().unwrap();
        let base = five_minute_run(r - Duration::minutes(5), 7);
        let out = AlignedAggregator::aggregate(&base, tf).unwrap();
        for c in &out {
            // every emitted candle aggregated exactly m/5 = 5 base candles,
            // verified indirectly via OHLC validity and alignment above;
            // the trailing partial period (2 candles) must not appear.
            let offset = (c.close_time - r).num_minutes();
            assert_eq!(offset.rem_euclid(25), 0);
        }
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn ohlc_validity_holds_for_every_emitted_candle() {
        let start = Utc.with_ymd_and_hms(2025, 10, 24, 0, 0, 0).unwrap();
        let base = five_minute_run(start, 100);
        let tf = Timeframe::parse("20m").unwrap();
        let out = AlignedAggregator::aggregate(&base, tf).unwrap();
        for c in &out {
            assert!(c.low <= c.open.min(c.close));
            assert!(c.high >= c.open.max(c.close));
        }
    }

    #[test]
    fn rejects_non_multiple_of_five() {
        let base = five_minute_run(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(), 10);
        let err = Timeframe::parse("7m");
        assert!(err.is_err()); // Timeframe itself rejects it before the aggregator sees it
        let _ = base;
    }
}
