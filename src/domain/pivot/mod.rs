pub mod allow_list;
pub mod variant;

pub use allow_list::PivotAllowList;
pub use variant::PivotVariant;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::domain::market::Candle;

/// A swing high/low. `bar_index` is the closed bar's `close_time`, used as
/// the cross-reference key by pattern state and the CHoCH confirmer (never a
/// reference back into the FIFO itself, so the FIFO stays the single owner).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub bar_index: DateTime<Utc>,
    pub price: Decimal,
    pub is_high: bool,
    pub variant: PivotVariant,
}

struct Entry {
    pivot: Pivot,
    window_index: usize,
}

/// Bounded FIFO of pivots for one (symbol, timeframe). Reset wholesale on
/// every rebuild; default capacity 500.
pub struct PivotHistory {
    entries: VecDeque<Entry>,
    capacity: usize,
}

impl PivotHistory {
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::with_capacity(capacity.min(64)), capacity }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pivots(&self) -> Vec<Pivot> {
        self.entries.iter().map(|e| e.pivot).collect()
    }

    /// Returns the `n` newest pivots, oldest first, or `None` if fewer than
    /// `n` are held.
    pub fn newest(&self, n: usize) -> Option<Vec<Pivot>> {
        if self.entries.len() < n {
            return None;
        }
        Some(self.entries.iter().skip(self.entries.len() - n).map(|e| e.pivot).collect())
    }

    /// Clears the history and re-derives it from `window` left to right,
    /// using `left`/`right` for the basic pivot test (default 1/1) and
    /// `allow` for the variant allow-list. Same-type adjacent candidates
    /// keep the stronger, same-type with a gap get a synthetic pivot
    /// inserted at the gap's extreme, different-type candidates just
    /// append.
    pub fn rebuild(&mut self, window: &[Candle], left: usize, right: usize, allow: &PivotAllowList) {
        self.entries.clear();
        let n = window.len();
        if n < left + right + 1 {
            return;
        }

        for i in left..(n - right) {
            if i == 0 || i + 1 >= n {
                continue;
            }
            let (h1, h2, h3) = (window[i - 1].high, window[i].high, window[i + 1].high);
            let (l1, l2, l3) = (window[i - 1].low, window[i].low, window[i + 1].low);

            let is_high_candidate = (1..=left).all(|k| window[i].high > window[i - k].high)
                && (1..=right).all(|k| window[i].high >= window[i + k].high);
            let is_low_candidate = (1..=left).all(|k| window[i].low < window[i - k].low)
                && (1..=right).all(|k| window[i].low <= window[i + k].low);

            if is_high_candidate {
                if let Some(variant) = variant::classify_high(h1, h2, h3, l1, l2, l3) {
                    if allow.is_allowed(variant) {
                        self.insert_accepted(
                            Pivot { bar_index: window[i].close_time, price: window[i].high, is_high: true, variant },
                            i,
                            window,
                        );
                    }
                }
            }
            if is_low_candidate {
                if let Some(variant) = variant::classify_low(l1, l2, l3, h1, h2, h3) {
                    if allow.is_allowed(variant) {
                        self.insert_accepted(
                            Pivot { bar_index: window[i].close_time, price: window[i].low, is_high: false, variant },
                            i,
                            window,
                        );
                    }
                }
            }
        }

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    fn insert_accepted(&mut self, candidate: Pivot, index: usize, window: &[Candle]) {
        let Some(last) = self.entries.back() else {
            self.entries.push_back(Entry { pivot: candidate, window_index: index });
            return;
        };

        if last.pivot.is_high != candidate.is_high {
            self.entries.push_back(Entry { pivot: candidate, window_index: index });
            return;
        }

        let gap = index - last.window_index;
        if gap <= 1 {
            // Zero bars between: keep the stronger of the two, drop the weaker.
            let stronger = if candidate.is_high {
                candidate.price > last.pivot.price
            } else {
                candidate.price < last.pivot.price
            };
            if stronger {
                self.entries.pop_back();
                self.entries.push_back(Entry { pivot: candidate, window_index: index });
            }
            return;
        }

        // Positive gap: insert a synthetic pivot of the opposite type at the
        // gap's extreme, scanning the entire gap (no cap), ties broken by
        // earliest bar index for rebuild-to-rebuild determinism.
        let gap_start = last.window_index + 1;
        let gap_end = index; // exclusive
        let mut extreme_idx = gap_start;
        for j in gap_start..gap_end {
            if candidate.is_high {
                if window[j].low < window[extreme_idx].low {
                    extreme_idx = j;
                }
            } else if window[j].high > window[extreme_idx].high {
                extreme_idx = j;
            }
        }
        let synthetic = Pivot {
            bar_index: window[extreme_idx].close_time,
            price: if candidate.is_high { window[extreme_idx].low } else { window[extreme_idx].high },
            is_high: !candidate.is_high,
            variant: PivotVariant::Synthetic,
        };
        self.entries.push_back(Entry { pivot: synthetic, window_index: extreme_idx });
        self.entries.push_back(Entry { pivot: candidate, window_index: index });
    }
}
