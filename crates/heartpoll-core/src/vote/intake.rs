//! Intake boundary: validates an inbound vote, consults the spam gate,
//! appends to the ledger and runs the immediate threshold check.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{GateVerdict, Polarity, SpamGate, SubjectSet, Vote};
use crate::announce::{Announcement, AnnouncementEngine};
use crate::error::DatabaseError;
use crate::events::VoteEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "value", rename_all = "snake_case")]
pub enum IgnoreReason {
    UnknownSubject(String),
    UnknownPolarity(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IntakeOutcome {
    /// Vote written. `announcements` are the immediate-threshold
    /// announcements it triggered; the caller dispatches them.
    Accepted {
        vote: Vote,
        announcements: Vec<Announcement>,
    },
    /// Voter is cooling down; nothing was written.
    Rejected { remaining_secs: u64 },
    /// Malformed request; nothing was written.
    Ignored { reason: IgnoreReason },
}

pub struct VoteIntake {
    gate: SpamGate,
    subjects: SubjectSet,
    offset: FixedOffset,
    engine: Arc<AnnouncementEngine>,
}

impl VoteIntake {
    pub fn new(
        gate: SpamGate,
        subjects: SubjectSet,
        offset: FixedOffset,
        engine: Arc<AnnouncementEngine>,
    ) -> Self {
        Self {
            gate,
            subjects,
            offset,
            engine,
        }
    }

    pub fn subjects(&self) -> &SubjectSet {
        &self.subjects
    }

    /// Process one vote request.
    ///
    /// # Errors
    /// Only storage failures while admitting the vote are errors. A failed
    /// threshold check after a successful write is logged and the vote is
    /// still reported as accepted.
    pub fn submit(&self, event: &VoteEvent) -> Result<IntakeOutcome, DatabaseError> {
        let Some(subject) = self.subjects.resolve(&event.subject) else {
            tracing::warn!(voter = %event.voter_id, "ignoring vote for unknown subject '{}'", event.subject);
            return Ok(IntakeOutcome::Ignored {
                reason: IgnoreReason::UnknownSubject(event.subject.clone()),
            });
        };
        let polarity = match event.polarity.parse::<Polarity>() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(voter = %event.voter_id, "ignoring vote: {e}");
                return Ok(IntakeOutcome::Ignored {
                    reason: IgnoreReason::UnknownPolarity(event.polarity.clone()),
                });
            }
        };

        let vote = Vote {
            voter_id: event.voter_id,
            subject: subject.clone(),
            polarity,
            day: event.received_at.with_timezone(&self.offset).date_naive(),
        };

        match self.gate.admit(&vote, event.received_at)? {
            GateVerdict::Reject { remaining_secs } => {
                tracing::info!(voter = %vote.voter_id, remaining_secs, "vote rejected by spam gate");
                Ok(IntakeOutcome::Rejected { remaining_secs })
            }
            GateVerdict::Allow => {
                tracing::info!(
                    voter = %vote.voter_id,
                    subject = %vote.subject,
                    polarity = %vote.polarity,
                    day = %vote.day,
                    "vote accepted"
                );
                let announcements = self
                    .engine
                    .check_immediate(&vote.subject, vote.day, event.received_at)
                    .unwrap_or_else(|e| {
                        tracing::error!("immediate threshold check failed: {e}");
                        Vec::new()
                    });
                Ok(IntakeOutcome::Accepted {
                    vote,
                    announcements,
                })
            }
        }
    }
}
