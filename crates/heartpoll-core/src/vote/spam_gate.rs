//! Per-voter cooldown guarding ledger writes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{Vote, VoterId};
use crate::error::DatabaseError;
use crate::storage::{Admission, VoteStore};

/// Default minimum gap between two accepted votes of one voter.
pub const DEFAULT_COOLDOWN_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum GateVerdict {
    Allow,
    /// Whole seconds left before the voter may vote again (at least 1).
    Reject { remaining_secs: u64 },
}

impl GateVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateVerdict::Allow)
    }
}

pub struct SpamGate {
    store: Arc<dyn VoteStore>,
    cooldown: Duration,
}

impl SpamGate {
    pub fn new(store: Arc<dyn VoteStore>, cooldown: Duration) -> Self {
        Self { store, cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Pure cooldown rule: allowed when there is no previous vote or at least
    /// `cooldown` has elapsed since it.
    pub fn evaluate(&self, last_vote_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> GateVerdict {
        let Some(last) = last_vote_at else {
            return GateVerdict::Allow;
        };
        let elapsed = now - last;
        if elapsed >= self.cooldown {
            return GateVerdict::Allow;
        }
        let remaining_ms = (self.cooldown - elapsed).num_milliseconds();
        let remaining_secs = (remaining_ms + 999) / 1000;
        GateVerdict::Reject {
            remaining_secs: remaining_secs.max(1) as u64,
        }
    }

    /// Read-only check against the stored cooldown entry. Does not claim the
    /// slot; [`SpamGate::admit`] is the write path.
    pub fn check(&self, voter: VoterId, now: DateTime<Utc>) -> Result<GateVerdict, DatabaseError> {
        let last = self.store.last_vote_at(voter)?;
        Ok(self.evaluate(last, now))
    }

    /// Claim the voter's cooldown slot and append the vote in one step.
    pub fn admit(&self, vote: &Vote, now: DateTime<Utc>) -> Result<GateVerdict, DatabaseError> {
        match self.store.admit_vote(vote, now, self.cooldown)? {
            Admission::Accepted => Ok(GateVerdict::Allow),
            Admission::CoolingDown { last_vote_at } => {
                let verdict = self.evaluate(Some(last_vote_at), now);
                // The store refused the slot; its verdict wins over a recomputed Allow.
                Ok(match verdict {
                    GateVerdict::Allow => GateVerdict::Reject {
                        remaining_secs: self.cooldown.num_seconds().max(1) as u64,
                    },
                    reject => reject,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use crate::vote::{Polarity, SubjectSet};
    use chrono::NaiveDate;

    fn gate() -> (SpamGate, Arc<Database>) {
        let db = Arc::new(Database::open_memory().unwrap());
        (
            SpamGate::new(db.clone(), Duration::seconds(DEFAULT_COOLDOWN_SECS)),
            db,
        )
    }

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn evaluate_rounds_remaining_up() {
        let (gate, _) = gate();
        assert_eq!(gate.evaluate(None, t(0)), GateVerdict::Allow);
        assert_eq!(
            gate.evaluate(Some(t(0)), t(0) + Duration::milliseconds(100)),
            GateVerdict::Reject { remaining_secs: 30 }
        );
        assert_eq!(
            gate.evaluate(Some(t(0)), t(29)),
            GateVerdict::Reject { remaining_secs: 1 }
        );
        assert_eq!(gate.evaluate(Some(t(0)), t(30)), GateVerdict::Allow);
    }

    #[test]
    fn check_does_not_write() {
        let (gate, db) = gate();
        assert!(gate.check(VoterId(1), t(0)).unwrap().is_allowed());
        assert!(db.last_vote_at(VoterId(1)).unwrap().is_none());
    }

    #[test]
    fn admit_then_check_rejects_within_window() {
        let (gate, db) = gate();
        let set = SubjectSet::new(["A"]).unwrap();
        let vote = Vote {
            voter_id: VoterId(1),
            subject: set.resolve("A").unwrap().clone(),
            polarity: Polarity::Positive,
            day: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
        };
        assert_eq!(gate.admit(&vote, t(0)).unwrap(), GateVerdict::Allow);
        assert_eq!(
            gate.check(VoterId(1), t(10)).unwrap(),
            GateVerdict::Reject { remaining_secs: 20 }
        );
        assert_eq!(
            gate.admit(&vote, t(10)).unwrap(),
            GateVerdict::Reject { remaining_secs: 20 }
        );
        assert_eq!(db.vote_count().unwrap(), 1);
    }

    #[test]
    fn admit_with_clock_behind_rejects() {
        let (gate, _) = gate();
        let set = SubjectSet::new(["A"]).unwrap();
        let vote = Vote {
            voter_id: VoterId(2),
            subject: set.resolve("A").unwrap().clone(),
            polarity: Polarity::Negative,
            day: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
        };
        gate.admit(&vote, t(100)).unwrap();
        assert!(!gate.admit(&vote, t(0)).unwrap().is_allowed());
    }
}
