use std::collections::HashSet;

use super::variant::PivotVariant;

/// Which pivot variants are accepted into a pivot history. A candidate that
/// matches no variant, or matches one that is not on the allow-list, is
/// discarded before any merge/synthetic-insertion logic runs.
#[derive(Debug, Clone)]
pub struct PivotAllowList {
    allowed: HashSet<PivotVariant>,
}

impl PivotAllowList {
    pub fn all_allowed() -> Self {
        let allowed = PivotVariant::ALL_HIGH
            .into_iter()
            .chain(PivotVariant::ALL_LOW)
            .collect();
        Self { allowed }
    }

    pub fn new(allowed: HashSet<PivotVariant>) -> Self {
        Self { allowed }
    }

    pub fn is_allowed(&self, variant: PivotVariant) -> bool {
        self.allowed.contains(&variant)
    }
}

impl Default for PivotAllowList {
    fn default() -> Self {
        Self::all_allowed()
    }
}
