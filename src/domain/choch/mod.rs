use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::Candle;
use crate::domain::pattern::{Direction, PatternGroup, PatternState, RecognisedPattern};

/// Volumes at the pivot bars p4..p8, used by the volume-cluster condition.
/// Caller picks the correct pivot set (offset 0 or 1, for the case where
/// the CHoCH bar equals the newest pivot) before constructing this.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotVolumes {
    pub v4: Decimal,
    pub v5: Decimal,
    pub v6: Decimal,
    pub v7: Decimal,
    pub v8: Decimal,
}

/// A confirmed directional signal from the three-candle rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChochResult {
    pub direction: Direction,
    pub group: PatternGroup,
    pub choch_price: Decimal,
    pub locked_bar_index: DateTime<Utc>,
}

/// Applies the three-candle rule to the three newest closed candles in
/// `window`. `pattern` must be the result of a prior, direction-matching
/// call to [`crate::domain::pattern::recognise`]; `p8_candle` is the candle
/// at the pattern's p8 pivot bar (for the body restriction); `volumes` are
/// the pivot-bar volumes for the same pivot set `pattern` was recognised
/// from. The confirmer is total: every input shape short of the full
/// conjunction returns `None`, never an error.
pub fn confirm(
    state: &mut PatternState,
    window: &[Candle],
    pattern: &RecognisedPattern,
    p8_candle: &Candle,
    volumes: &PivotVolumes,
) -> Option<ChochResult> {
    if state.choch_locked {
        return None;
    }
    if window.len() < 3 {
        return None;
    }

    let n = window.len();
    let c_prev2 = &window[n - 3];
    let c_prev1 = &window[n - 2];
    let c_curr = &window[n - 1];

    if c_curr.close_time <= pattern.p8_bar_index {
        return None;
    }

    // Pattern-direction matching: an up-confirmation only fires against a
    // recognised down-pattern and vice versa, so the confirmation direction
    // is always the reverse of the recognised direction.
    let direction = pattern.direction.reverse();
    let prices = &pattern.prices;

    let choch_bar_ok = match direction {
        Direction::Up => {
            c_prev1.low > c_prev2.low
                && c_prev1.close > c_prev2.high
                && c_prev1.close > prices.p6
                && c_prev1.close < prices.p2
                && c_prev1.close > prices.p4
        }
        Direction::Down => {
            c_prev1.high < c_prev2.high
                && c_prev1.close < c_prev2.low
                && c_prev1.close < prices.p6
                && c_prev1.close > prices.p2
                && c_prev1.close < prices.p4
        }
    };
    if !choch_bar_ok {
        return None;
    }

    let basic_confirmation = match direction {
        Direction::Up => c_curr.close > c_prev2.high,
        Direction::Down => c_curr.close < c_prev2.low,
    };
    if !basic_confirmation {
        return None;
    }

    let ceiling_floor_ok = match (direction, pattern.group) {
        (Direction::Up, PatternGroup::G1 | PatternGroup::G3) => c_curr.close <= prices.p5,
        (Direction::Up, PatternGroup::G2) => c_curr.close <= prices.p7,
        (Direction::Down, PatternGroup::G1 | PatternGroup::G3) => c_curr.close >= prices.p5,
        (Direction::Down, PatternGroup::G2) => c_curr.close >= prices.p7,
    };
    if !ceiling_floor_ok {
        return None;
    }

    let v_choch = c_prev1.volume;
    let volume_ok = match pattern.group {
        PatternGroup::G1 => {
            let max_678 = volumes.v6.max(volumes.v7).max(volumes.v8);
            let max_456 = volumes.v4.max(volumes.v5).max(volumes.v6);
            (volumes.v8 == max_678 || volumes.v6 == max_678 || v_choch >= max_678)
                && (volumes.v4 == max_456 || volumes.v6 == max_456)
        }
        PatternGroup::G2 | PatternGroup::G3 => {
            let max_all = volumes.v4.max(volumes.v5).max(volumes.v6).max(volumes.v7).max(volumes.v8);
            volumes.v4 == max_all || volumes.v8 == max_all || v_choch >= max_all
        }
    };
    if !volume_ok {
        return None;
    }

    let p8_body_high = p8_candle.body_high();
    let p8_body_low = p8_candle.body_low();
    let body_ok = match direction {
        Direction::Up => c_curr.close > p8_candle.high && c_curr.low > p8_body_high,
        Direction::Down => c_curr.close < p8_candle.low && c_curr.high < p8_body_low,
    };
    if !body_ok {
        return None;
    }

    state.choch_locked = true;
    state.locked_bar_index = Some(c_prev1.close_time);
    state.locked_price = Some(c_prev1.close);

    Some(ChochResult { direction, group: pattern.group, choch_price: c_prev1.close, locked_bar_index: c_prev1.close_time })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pattern::{Direction, PatternGroup, PatternPrices};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t(mins: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(mins)
    }

    fn candle(mins: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> Candle {
        Candle::new(open, high, low, close, volume, t(mins)).unwrap()
    }

    /// Seed scenario 4/5: up-pattern, down-confirmation, G1, then lock idempotence.
    fn up_pattern() -> RecognisedPattern {
        RecognisedPattern {
            group: PatternGroup::G1,
            direction: Direction::Up,
            p4_bar_index: t(20),
            p5_bar_index: t(25),
            p8_bar_index: t(35),
            prices: PatternPrices { p2: dec!(102), p4: dec!(106), p5: dec!(103), p6: dec!(110), p7: dec!(105), p8: dec!(115) },
        }
    }

    #[test]
    fn down_confirmation_fires_against_up_pattern_then_locks() {
        let pattern = up_pattern();
        let p8_candle = candle(35, dec!(112), dec!(115), dec!(111), dec!(113), dec!(50));
        let volumes = PivotVolumes { v4: dec!(10), v5: dec!(10), v6: dec!(10), v7: dec!(10), v8: dec!(10) };

        let c_prev2 = candle(40, dec!(110), dec!(113), dec!(109), dec!(111), dec!(20));
        let c_prev1 = candle(45, dec!(105), dec!(112), dec!(100), dec!(104), dec!(30));
        let c_curr = candle(50, dec!(106), dec!(106), dec!(95), dec!(104), dec!(20));
        let window = vec![c_prev2, c_prev1, c_curr];

        let mut state = PatternState::default();
        let result = confirm(&mut state, &window, &pattern, &p8_candle, &volumes);
        let result = result.expect("down-confirmation should fire");
        assert_eq!(result.direction, Direction::Down);
        assert_eq!(result.group, PatternGroup::G1);
        assert!(state.choch_locked);

        // Lock idempotence: a second call on the same state returns no signal.
        let again = confirm(&mut state, &window, &pattern, &p8_candle, &volumes);
        assert!(again.is_none());
    }

    #[test]
    fn too_few_bars_returns_no_signal_without_error() {
        let pattern = up_pattern();
        let p8_candle = candle(35, dec!(112), dec!(115), dec!(111), dec!(113), dec!(50));
        let volumes = PivotVolumes { v4: dec!(10), v5: dec!(10), v6: dec!(10), v7: dec!(10), v8: dec!(10) };
        let window = vec![candle(40, dec!(1), dec!(1), dec!(1), dec!(1), dec!(1))];
        let mut state = PatternState::default();
        assert!(confirm(&mut state, &window, &pattern, &p8_candle, &volumes).is_none());
    }

    #[test]
    fn empty_window_returns_no_signal() {
        let pattern = up_pattern();
        let p8_candle = candle(35, dec!(112), dec!(115), dec!(111), dec!(113), dec!(50));
        let volumes = PivotVolumes { v4: dec!(10), v5: dec!(10), v6: dec!(10), v7: dec!(10), v8: dec!(10) };
        let mut state = PatternState::default();
        assert!(confirm(&mut state, &[], &pattern, &p8_candle, &volumes).is_none());
    }
}
