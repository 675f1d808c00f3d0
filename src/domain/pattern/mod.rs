use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::pivot::Pivot;

/// Direction a recognised pattern or a confirmed signal points in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }
}

/// Named geometric ordering constraint a recognised pattern satisfies.
/// Checked in priority order G1 > G2 > G3 (first match wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternGroup {
    G1,
    G2,
    G3,
}

/// Reference prices captured at recognition time, used as CHoCH thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternPrices {
    pub p2: Decimal,
    pub p4: Decimal,
    pub p5: Decimal,
    pub p6: Decimal,
    pub p7: Decimal,
    pub p8: Decimal,
}

/// The validated 8-pivot structure. Cross-references the pivot FIFO only by
/// bar index (never an index/reference into it, per the redesign flag
/// against cyclic pivot/pattern references).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecognisedPattern {
    pub group: PatternGroup,
    pub direction: Direction,
    pub p4_bar_index: DateTime<Utc>,
    pub p5_bar_index: DateTime<Utc>,
    pub p8_bar_index: DateTime<Utc>,
    pub prices: PatternPrices,
}

/// Per (symbol, timeframe) pattern state. Reset wholesale at every pivot
/// rebuild; `recognised` is set by [`recognise`], `choch_locked` is set by
/// the confirmer and cleared only by the next rebuild.
#[derive(Debug, Clone, Default)]
pub struct PatternState {
    pub recognised: Option<RecognisedPattern>,
    pub choch_locked: bool,
    pub locked_bar_index: Option<DateTime<Utc>>,
    pub locked_price: Option<Decimal>,
}

impl PatternState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Evaluates the 8 newest pivots (or, with `offset = 1`, pivots
/// `[p2..p9]`, used when the CHoCH bar itself is a newly-arrived pivot) for
/// alternation, retest, extreme, breakout, and one of G1/G2/G3. Pivot prices
/// already equal the high/low of their own bar, so the retest/breakout
/// comparisons over pivot prices are exactly bar-level comparisons.
pub fn recognise(pivots: &[Pivot], offset: usize) -> Option<RecognisedPattern> {
    if pivots.len() < 8 + offset {
        return None;
    }
    let end = pivots.len() - offset;
    let p = &pivots[end - 8..end];

    let up_alternation = !p[0].is_high
        && p[1].is_high
        && !p[2].is_high
        && p[3].is_high
        && !p[4].is_high
        && p[5].is_high
        && !p[6].is_high
        && p[7].is_high;
    let down_alternation = p[0].is_high
        && !p[1].is_high
        && p[2].is_high
        && !p[3].is_high
        && p[4].is_high
        && !p[5].is_high
        && p[6].is_high
        && !p[7].is_high;

    if up_alternation {
        if let Some(pattern) = try_direction(p, Direction::Up) {
            return Some(pattern);
        }
    }
    if down_alternation {
        if let Some(pattern) = try_direction(p, Direction::Down) {
            return Some(pattern);
        }
    }
    None
}

fn try_direction(p: &[Pivot], direction: Direction) -> Option<RecognisedPattern> {
    let (p1, p2, p3, p4, p5, p6, p7, p8) = (p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7]);

    let retest = match direction {
        Direction::Up => p7.price < p4.price,
        Direction::Down => p7.price > p4.price,
    };
    if !retest {
        return None;
    }

    let all = [p1.price, p2.price, p3.price, p4.price, p5.price, p6.price, p7.price, p8.price];
    let extreme = match direction {
        Direction::Up => all.into_iter().max() == Some(p8.price),
        Direction::Down => all.into_iter().min() == Some(p8.price),
    };
    if !extreme {
        return None;
    }

    let breakout = match direction {
        Direction::Up => p5.price > p2.price,
        Direction::Down => p5.price < p2.price,
    };
    if !breakout {
        return None;
    }

    let group = match direction {
        Direction::Up => {
            if p2.price < p4.price && p4.price < p6.price && p6.price < p8.price && p3.price < p5.price && p5.price < p7.price {
                Some(PatternGroup::G1)
            } else if p3.price < p7.price
                && p7.price < p5.price
                && p2.price < p6.price
                && p6.price < p4.price
                && p4.price < p8.price
                && p2.price < p5.price
            {
                Some(PatternGroup::G2)
            } else if p3.price < p5.price
                && p5.price < p7.price
                && p2.price < p6.price
                && p6.price < p4.price
                && p4.price < p8.price
                && p2.price < p5.price
            {
                Some(PatternGroup::G3)
            } else {
                None
            }
        }
        Direction::Down => {
            if p2.price > p4.price && p4.price > p6.price && p6.price > p8.price && p3.price > p5.price && p5.price > p7.price {
                Some(PatternGroup::G1)
            } else if p3.price > p7.price
                && p7.price > p5.price
                && p2.price > p6.price
                && p6.price > p4.price
                && p4.price > p8.price
                && p2.price > p5.price
            {
                Some(PatternGroup::G2)
            } else if p3.price > p5.price
                && p5.price > p7.price
                && p2.price > p6.price
                && p6.price > p4.price
                && p4.price > p8.price
                && p2.price > p5.price
            {
                Some(PatternGroup::G3)
            } else {
                None
            }
        }
    };

    group.map(|group| RecognisedPattern {
        group,
        direction,
        p4_bar_index: p4.bar_index,
        p5_bar_index: p5.bar_index,
        p8_bar_index: p8.bar_index,
        prices: PatternPrices { p2: p2.price, p4: p4.price, p5: p5.price, p6: p6.price, p7: p7.price, p8: p8.price },
    })
}
