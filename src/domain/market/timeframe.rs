use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::ScannerError;

/// A candle interval, native to the exchange or synthesised from 5m base
/// candles. Represented as raw minutes rather than an enum-per-interval so
/// that new native intervals don't require a match-arm everywhere; validity
/// is checked once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timeframe {
    minutes: u32,
}

/// Intervals the exchange port serves directly.
const NATIVE_MINUTES: &[u32] = &[1, 3, 5, 15, 30, 60, 120, 240, 360, 480, 720, 1440];

/// Intervals synthesised from 5m base candles, each with a fixed reference
/// instant (`examples/original_source/data/aligned_candle_aggregator.py`'s
/// `TIMEFRAME_REFERENCES`). 25m is the load-bearing case: 1440 is not a
/// multiple of 25, so midnight-anchored aggregation would drift across days.
fn synthetic_reference(minutes: u32) -> Option<DateTime<Utc>> {
    let ymd_hms = |y, mo, d, h, mi| Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single();
    match minutes {
        10 => ymd_hms(2025, 10, 24, 17, 10),
        20 => ymd_hms(2025, 10, 24, 17, 20),
        25 => ymd_hms(2025, 10, 24, 17, 5),
        40 => ymd_hms(2025, 10, 24, 16, 40),
        45 => ymd_hms(2025, 10, 24, 17, 0),
        50 => ymd_hms(2025, 10, 20, 0, 0),
        _ => None,
    }
}

impl Timeframe {
    pub fn from_minutes(minutes: u32) -> Result<Self, ScannerError> {
        if NATIVE_MINUTES.contains(&minutes) || synthetic_reference(minutes).is_some() {
            Ok(Self { minutes })
        } else {
            Err(ScannerError::Config(format!(
                "unsupported timeframe: {minutes}m is neither a native exchange interval nor a configured synthesised one"
            )))
        }
    }

    /// Parses labels like `"5m"`, `"1h"`, `"1d"`.
    pub fn parse(label: &str) -> Result<Self, ScannerError> {
        let label = label.trim();
        let (digits, unit) = label.split_at(
            label
                .find(|c: char| !c.is_ascii_digit())
                .ok_or_else(|| ScannerError::Config(format!("malformed timeframe '{label}'")))?,
        );
        let n: u32 = digits
            .parse()
            .map_err(|_| ScannerError::Config(format!("malformed timeframe '{label}'")))?;
        let minutes = match unit {
            "m" => n,
            "h" => n * 60,
            "d" => n * 1440,
            other => {
                return Err(ScannerError::Config(format!("unknown timeframe unit '{other}' in '{label}'")));
            }
        };
        Self::from_minutes(minutes)
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn is_native(&self) -> bool {
        NATIVE_MINUTES.contains(&self.minutes)
    }

    pub fn is_synthetic(&self) -> bool {
        !self.is_native()
    }

    /// `None` for native timeframes; `Some(R)` for synthesised ones.
    pub fn reference_instant(&self) -> Option<DateTime<Utc>> {
        synthetic_reference(self.minutes)
    }

    pub fn label(&self) -> String {
        if self.minutes % 1440 == 0 {
            format!("{}d", self.minutes / 1440)
        } else if self.minutes % 60 == 0 && self.minutes >= 60 {
            format!("{}h", self.minutes / 60)
        } else {
            format!("{}m", self.minutes)
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_native_and_synthetic_labels() {
        assert_eq!(Timeframe::parse("15m").unwrap().minutes(), 15);
        assert_eq!(Timeframe::parse("1h").unwrap().minutes(), 60);
        assert_eq!(Timeframe::parse("1d").unwrap().minutes(), 1440);
        assert_eq!(Timeframe::parse("25m").unwrap().minutes(), 25);
    }

    #[test]
    fn rejects_unsupported_interval() {
        assert!(Timeframe::parse("7m").is_err());
    }

    #[test]
    fn twenty_five_minute_reference_is_fixed_not_midnight() {
        let tf = Timeframe::parse("25m").unwrap();
        let r = tf.reference_instant().unwrap();
        assert_eq!(r.to_rfc3339(), "2025-10-24T17:05:00+00:00");
    }

    #[test]
    fn native_timeframes_have_no_reference_instant() {
        let tf = Timeframe::parse("15m").unwrap();
        assert!(tf.reference_instant().is_none());
        assert!(tf.is_native());
    }

    #[test]
    fn label_roundtrips() {
        assert_eq!(Timeframe::parse("4h").unwrap().label(), "4h");
        assert_eq!(Timeframe::parse("1d").unwrap().label(), "1d");
        assert_eq!(Timeframe::parse("45m").unwrap().label(), "45m");
    }
}
