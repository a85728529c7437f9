//! Tier classification rules.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stats::Counts;
use crate::storage::ThresholdConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Super,
    Not,
    Average,
    Champion,
    Loser,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Super => "super",
            Tier::Not => "not",
            Tier::Average => "average",
            Tier::Champion => "champion",
            Tier::Loser => "loser",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vote-triggered check: each polarity strictly above its daily threshold
/// yields its own tier.
pub fn immediate_tiers(counts: Counts, thresholds: &ThresholdConfig) -> Vec<Tier> {
    let mut tiers = Vec::new();
    if counts.positive > thresholds.daily_heart {
        tiers.push(Tier::Super);
    }
    if counts.negative > thresholds.daily_black {
        tiers.push(Tier::Not);
    }
    tiers
}

/// Daily rollover: exactly one tier per subject with votes, highest
/// priority first. `None` when the subject got no votes.
pub fn rollover_tier(counts: Counts, thresholds: &ThresholdConfig) -> Option<Tier> {
    if counts.total() == 0 {
        return None;
    }
    if counts.positive >= thresholds.rollover_super {
        Some(Tier::Super)
    } else if counts.negative >= thresholds.rollover_not {
        Some(Tier::Not)
    } else {
        Some(Tier::Average)
    }
}

/// Monthly rollover: champion and loser are independent and inclusive.
pub fn monthly_tiers(counts: Counts, thresholds: &ThresholdConfig) -> Vec<Tier> {
    let mut tiers = Vec::new();
    if counts.positive >= thresholds.monthly {
        tiers.push(Tier::Champion);
    }
    if counts.negative >= thresholds.monthly {
        tiers.push(Tier::Loser);
    }
    tiers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(positive: u64, negative: u64) -> Counts {
        Counts { positive, negative }
    }

    #[test]
    fn immediate_is_strict_and_independent() {
        let t = ThresholdConfig::default();
        assert!(immediate_tiers(c(3, 3), &t).is_empty());
        assert_eq!(immediate_tiers(c(4, 0), &t), vec![Tier::Super]);
        assert_eq!(immediate_tiers(c(4, 4), &t), vec![Tier::Super, Tier::Not]);
    }

    #[test]
    fn rollover_is_exclusive_with_priority() {
        let t = ThresholdConfig::default();
        assert_eq!(rollover_tier(c(0, 0), &t), None);
        assert_eq!(rollover_tier(c(4, 9), &t), Some(Tier::Super));
        assert_eq!(rollover_tier(c(3, 4), &t), Some(Tier::Not));
        assert_eq!(rollover_tier(c(1, 1), &t), Some(Tier::Average));
        assert_eq!(rollover_tier(c(0, 1), &t), Some(Tier::Average));
    }

    #[test]
    fn monthly_boundary_is_inclusive() {
        let t = ThresholdConfig::default();
        assert_eq!(monthly_tiers(c(50, 0), &t), vec![Tier::Champion]);
        assert!(monthly_tiers(c(49, 49), &t).is_empty());
        assert_eq!(monthly_tiers(c(50, 50), &t), vec![Tier::Champion, Tier::Loser]);
    }
}
