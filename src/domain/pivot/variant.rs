use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Micro-shape of the three-bar neighbourhood around a pivot, plus the
/// `Synthetic` tag used for pivots inserted to preserve alternation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PivotVariant {
    Ph1,
    Ph2,
    Ph3,
    Ph4,
    Ph5,
    Pl1,
    Pl2,
    Pl3,
    Pl4,
    Pl5,
    Synthetic,
}

impl PivotVariant {
    pub fn is_high(&self) -> bool {
        matches!(self, Self::Ph1 | Self::Ph2 | Self::Ph3 | Self::Ph4 | Self::Ph5)
    }

    pub fn is_low(&self) -> bool {
        matches!(self, Self::Pl1 | Self::Pl2 | Self::Pl3 | Self::Pl4 | Self::Pl5)
    }

    pub const ALL_HIGH: [PivotVariant; 5] =
        [Self::Ph1, Self::Ph2, Self::Ph3, Self::Ph4, Self::Ph5];
    pub const ALL_LOW: [PivotVariant; 5] =
        [Self::Pl1, Self::Pl2, Self::Pl3, Self::Pl4, Self::Pl5];
}

type HighPredicate = fn(Decimal, Decimal, Decimal, Decimal, Decimal, Decimal) -> bool;

/// PH1..PH5, evaluated in order, first match wins. Arguments are
/// `(h1, h2, h3, l1, l2, l3)` for the triple centered on the candidate.
const HIGH_TABLE: [(PivotVariant, HighPredicate); 5] = [
    (PivotVariant::Ph1, |h1, h2, h3, l1, l2, l3| h2 > h1 && h2 > h3 && l2 > l1 && l2 > l3),
    (PivotVariant::Ph2, |h1, h2, h3, l1, l2, l3| h2 >= h1 && h2 > h3 && l2 > l3 && l2 < l1),
    (PivotVariant::Ph3, |h1, h2, h3, l1, l2, l3| h2 > h1 && h2 >= h3 && l2 < l3 && l2 > l1),
    (PivotVariant::Ph4, |h1, h2, h3, l1, l2, l3| h2 >= h3 && h2 > h1 && l2 <= l3 && l2 > l1),
    (PivotVariant::Ph5, |h1, h2, h3, l1, l2, l3| h2 >= h3 && h2 >= h1 && l2 <= l3 && l2 > l1),
];

/// PL1..PL5: mirror of the high table (high/low swapped, `>` flipped to `<`).
const LOW_TABLE: [(PivotVariant, HighPredicate); 5] = [
    (PivotVariant::Pl1, |l1, l2, l3, h1, h2, h3| l2 < l1 && l2 < l3 && h2 < h1 && h2 < h3),
    (PivotVariant::Pl2, |l1, l2, l3, h1, h2, h3| l2 <= l1 && l2 < l3 && h2 < h3 && h2 > h1),
    (PivotVariant::Pl3, |l1, l2, l3, h1, h2, h3| l2 < l1 && l2 <= l3 && h2 > h3 && h2 < h1),
    (PivotVariant::Pl4, |l1, l2, l3, h1, h2, h3| l2 <= l3 && l2 < l1 && h2 >= h3 && h2 < h1),
    (PivotVariant::Pl5, |l1, l2, l3, h1, h2, h3| l2 <= l3 && l2 <= l1 && h2 >= h3 && h2 < h1),
];

/// Classifies a candidate pivot high from the (high, low) triple centered on
/// it. Returns `None` if no variant matches (the candidate is discarded).
pub fn classify_high(
    h1: Decimal,
    h2: Decimal,
    h3: Decimal,
    l1: Decimal,
    l2: Decimal,
    l3: Decimal,
) -> Option<PivotVariant> {
    HIGH_TABLE.iter().find(|(_, pred)| pred(h1, h2, h3, l1, l2, l3)).map(|(v, _)| *v)
}

/// Classifies a candidate pivot low from the (low, high) triple centered on
/// it (mirror of [`classify_high`]).
pub fn classify_low(
    l1: Decimal,
    l2: Decimal,
    l3: Decimal,
    h1: Decimal,
    h2: Decimal,
    h3: Decimal,
) -> Option<PivotVariant> {
    LOW_TABLE.iter().find(|(_, pred)| pred(l1, l2, l3, h1, h2, h3)).map(|(v, _)| *v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ph1_strict_peak() {
        let v = classify_high(dec!(10), dec!(15), dec!(11), dec!(4), dec!(8), dec!(3));
        assert_eq!(v, Some(PivotVariant::Ph1));
    }

    #[test]
    fn pl1_strict_trough() {
        let v = classify_low(dec!(10), dec!(4), dec!(9), dec!(15), dec!(8), dec!(16));
        assert_eq!(v, Some(PivotVariant::Pl1));
    }

    #[test]
    fn no_match_returns_none() {
        let v = classify_high(dec!(10), dec!(5), dec!(11), dec!(4), dec!(8), dec!(3));
        assert_eq!(v, None);
    }
}
