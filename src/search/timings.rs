//! Elapsed-time breakdowns reported by searches.

use serde::Serialize;
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// Time spent inside one probe round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RoundTimings {
    /// Whole round.
    pub elapsed: Duration,
    /// Distance phase including candidate gathering.
    pub pairwise: Duration,
    /// Distance kernel only.
    pub pure_pairwise: Duration,
    /// Per-row sorting.
    pub sort: Duration,
}

impl Add for RoundTimings {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            elapsed: self.elapsed + rhs.elapsed,
            pairwise: self.pairwise + rhs.pairwise,
            pure_pairwise: self.pure_pairwise + rhs.pure_pairwise,
            sort: self.sort + rhs.sort,
        }
    }
}

impl AddAssign for RoundTimings {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Time spent in a full multi-round search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchTimings {
    /// Whole search call.
    pub total: Duration,
    /// Routing model inference.
    pub inference: Duration,
    /// Deriving per-query thresholds from the running top-k.
    pub threshold: Duration,
    /// Merging round results into the running top-k.
    pub merge: Duration,
    /// Sum over rounds.
    pub rounds: RoundTimings,
    /// Each round separately, in probe order.
    pub per_round: Vec<RoundTimings>,
}

impl SearchTimings {
    /// Record one finished round.
    pub fn push_round(&mut self, round: RoundTimings) {
        self.rounds += round;
        self.per_round.push(round);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_accumulate() {
        let mut timings = SearchTimings::default();
        let round = RoundTimings {
            elapsed: Duration::from_millis(4),
            pairwise: Duration::from_millis(3),
            pure_pairwise: Duration::from_millis(2),
            sort: Duration::from_millis(1),
        };
        timings.push_round(round);
        timings.push_round(round);

        assert_eq!(timings.per_round.len(), 2);
        assert_eq!(timings.rounds.elapsed, Duration::from_millis(8));
        assert_eq!(timings.rounds.sort, Duration::from_millis(2));
        assert!(timings.per_round[0] <= timings.rounds);
    }
}
