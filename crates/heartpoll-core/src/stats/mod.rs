//! Per-subject tallies over a day or a month.
//!
//! Tallies are never persisted; every call recomputes them from the ledger.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::DatabaseError;
use crate::storage::VoteStore;
use crate::vote::{Polarity, Subject, SubjectSet, Vote};

/// Aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Period {
    Day { date: NaiveDate },
    Month { year: i32, month: u32 },
}

impl Period {
    pub fn day(date: NaiveDate) -> Self {
        Period::Day { date }
    }

    /// The month containing `date`.
    pub fn month_of(date: NaiveDate) -> Self {
        Period::Month {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The calendar month before the one containing `date`.
    pub fn month_before(date: NaiveDate) -> Self {
        if date.month() == 1 {
            Period::Month {
                year: date.year() - 1,
                month: 12,
            }
        } else {
            Period::Month {
                year: date.year(),
                month: date.month() - 1,
            }
        }
    }

    /// Stable key used for announced markers: `YYYY-MM-DD` or `YYYY-MM`.
    pub fn key(&self) -> String {
        match self {
            Period::Day { date } => date.format("%Y-%m-%d").to_string(),
            Period::Month { year, month } => format!("{year:04}-{month:02}"),
        }
    }

    /// Whether a vote cast on `day` belongs to this period.
    pub fn contains(&self, day: NaiveDate) -> bool {
        match self {
            Period::Day { date } => *date == day,
            Period::Month { year, month } => day.year() == *year && day.month() == *month,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub positive: u64,
    pub negative: u64,
}

impl Counts {
    pub fn total(&self) -> u64 {
        self.positive + self.negative
    }

    fn bump(&mut self, polarity: Polarity) {
        match polarity {
            Polarity::Positive => self.positive += 1,
            Polarity::Negative => self.negative += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectTally {
    pub subject: Subject,
    #[serde(flatten)]
    pub counts: Counts,
}

/// Counts for every configured subject, in configuration order. Subjects
/// without votes are present with zero counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub period: Period,
    pub subjects: Vec<SubjectTally>,
}

impl Tally {
    /// Zero-filled tally for every subject.
    pub fn empty(period: Period, subjects: &SubjectSet) -> Self {
        Self {
            period,
            subjects: subjects
                .iter()
                .map(|s| SubjectTally {
                    subject: s.clone(),
                    counts: Counts::default(),
                })
                .collect(),
        }
    }

    /// Group votes by `(subject, polarity)`. Votes outside the period or for
    /// subjects no longer configured are skipped.
    pub fn from_votes<'a>(
        period: Period,
        subjects: &SubjectSet,
        votes: impl IntoIterator<Item = &'a Vote>,
    ) -> Self {
        let mut tally = Self::empty(period, subjects);
        for vote in votes {
            if !period.contains(vote.day) {
                continue;
            }
            match tally.subjects.iter_mut().find(|t| t.subject == vote.subject) {
                Some(entry) => entry.counts.bump(vote.polarity),
                None => tracing::debug!("skipping vote for unconfigured subject '{}'", vote.subject),
            }
        }
        tally
    }

    pub fn get(&self, subject: &Subject) -> Option<Counts> {
        self.subjects
            .iter()
            .find(|t| &t.subject == subject)
            .map(|t| t.counts)
    }

    pub fn total(&self) -> u64 {
        self.subjects.iter().map(|t| t.counts.total()).sum()
    }
}

/// Computes tallies from the injected store.
pub struct Aggregator {
    store: Arc<dyn VoteStore>,
    subjects: SubjectSet,
}

impl Aggregator {
    pub fn new(store: Arc<dyn VoteStore>, subjects: SubjectSet) -> Self {
        Self { store, subjects }
    }

    pub fn subjects(&self) -> &SubjectSet {
        &self.subjects
    }

    /// Deterministic for a given period and ledger state.
    pub fn tally_for(&self, period: Period) -> Result<Tally, DatabaseError> {
        let votes = match period {
            Period::Day { date } => self.store.votes_on(date)?,
            Period::Month { year, month } => self.store.votes_in_month(year, month)?,
        };
        Ok(Tally::from_votes(period, &self.subjects, &votes))
    }
}
