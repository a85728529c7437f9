mod config;
pub mod database;
pub mod migrations;

pub use config::{
    BotConfig, Config, ScheduleConfig, SpamConfig, ThresholdConfig, TierConfig, TierTemplates,
};
pub use database::Database;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::path::PathBuf;

use crate::error::DatabaseError;
use crate::vote::{Subject, Vote, VoterId};

/// Returns `~/.config/heartpoll[-dev]/`, creating it when missing.
///
/// Set HEARTPOLL_ENV=dev to use the development data directory, or
/// HEARTPOLL_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("HEARTPOLL_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("HEARTPOLL_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("heartpoll-dev")
            } else {
                base_dir.join("heartpoll")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Result of an atomic cooldown check plus ledger append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Cooldown claimed and the vote appended.
    Accepted,
    /// The voter is still cooling down; nothing was written.
    CoolingDown { last_vote_at: DateTime<Utc> },
}

/// Persistence seam for everything the pipeline reads or writes.
///
/// Injected as `Arc<dyn VoteStore>` into intake, aggregation, announcement
/// and scheduling so tests can substitute their own implementation.
pub trait VoteStore: Send + Sync {
    /// Append one vote. Every call creates a new row.
    fn append_vote(&self, vote: &Vote) -> Result<(), DatabaseError>;

    /// All votes whose `day` equals `day`.
    fn votes_on(&self, day: NaiveDate) -> Result<Vec<Vote>, DatabaseError>;

    /// All votes whose `day` falls in the given calendar month.
    fn votes_in_month(&self, year: i32, month: u32) -> Result<Vec<Vote>, DatabaseError>;

    /// Last accepted vote instant for a voter, if any.
    fn last_vote_at(&self, voter: VoterId) -> Result<Option<DateTime<Utc>>, DatabaseError>;

    /// Claim the voter's cooldown slot and append `vote` as one unit.
    ///
    /// The slot is claimed only when no earlier vote exists or the stored
    /// instant is at least `cooldown` before `now`, so the stored instant
    /// never moves backwards.
    fn admit_vote(
        &self,
        vote: &Vote,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Admission, DatabaseError>;

    /// Record that `kind` was announced for `subject` in `period`.
    /// Returns `false` if it had already been recorded.
    fn mark_announced(
        &self,
        subject: &Subject,
        period: &str,
        kind: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Whether `kind` was already announced for `subject` in `period`.
    fn is_announced(&self, subject: &Subject, period: &str, kind: &str)
        -> Result<bool, DatabaseError>;

    /// Local date a scheduler job last fired.
    fn last_fired(&self, job: &str) -> Result<Option<NaiveDate>, DatabaseError>;

    /// Persist the local date a scheduler job fired.
    fn record_fired(&self, job: &str, on: NaiveDate) -> Result<(), DatabaseError>;
}
