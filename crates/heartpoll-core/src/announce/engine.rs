//! Announcement engine.
//!
//! Turns tallies into announcements for three paths:
//!
//! ```text
//! vote accepted      -> check_immediate   (per subject, per day)
//! daily rollover     -> rollover_daily    (per subject, per completed day)
//! monthly rollover   -> rollover_monthly  (per subject, per completed month)
//! ```
//!
//! Each (subject, period, kind) is announced at most once: the engine claims
//! an announced marker in the store before emitting.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::tier::{immediate_tiers, monthly_tiers, rollover_tier, Tier};
use crate::error::DatabaseError;
use crate::stats::{Aggregator, Counts, Period, Tally};
use crate::storage::{ThresholdConfig, TierTemplates, VoteStore};
use crate::vote::{Subject, SubjectSet};

/// Marker kind shared by every daily-rollover tier.
const ROLLOVER_KIND: &str = "rollover";

/// One outbound announcement, ready to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub subject: Subject,
    pub period: Period,
    pub tier: Tier,
    pub counts: Counts,
    /// Broadcast asset bound to the tier, if any.
    pub asset: Option<String>,
    pub text: String,
}

/// Fill `{subject}`, `{positive}` and `{negative}` in a tier template.
pub fn render_template(template: &str, subject: &Subject, counts: Counts) -> String {
    template
        .replace("{subject}", subject.name())
        .replace("{positive}", &counts.positive.to_string())
        .replace("{negative}", &counts.negative.to_string())
}

pub struct AnnouncementEngine {
    aggregator: Aggregator,
    store: Arc<dyn VoteStore>,
    thresholds: ThresholdConfig,
    tiers: TierTemplates,
    /// When false, markers are only read, never written.
    commit: bool,
}

impl AnnouncementEngine {
    pub fn new(
        store: Arc<dyn VoteStore>,
        subjects: SubjectSet,
        thresholds: ThresholdConfig,
        tiers: TierTemplates,
    ) -> Self {
        Self {
            aggregator: Aggregator::new(store.clone(), subjects),
            store,
            thresholds,
            tiers,
            commit: true,
        }
    }

    /// Dry-run mode: compute what would be announced without claiming markers.
    pub fn preview(mut self) -> Self {
        self.commit = false;
        self
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    fn render(&self, subject: &Subject, period: Period, tier: Tier, counts: Counts) -> Announcement {
        let cfg = self.tiers.get(tier);
        Announcement {
            subject: subject.clone(),
            period,
            tier,
            counts,
            asset: cfg.asset.clone(),
            text: render_template(&cfg.template, subject, counts),
        }
    }

    fn claim(
        &self,
        subject: &Subject,
        period: Period,
        kind: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let key = period.key();
        if self.commit {
            self.store.mark_announced(subject, &key, kind, at)
        } else {
            Ok(!self.store.is_announced(subject, &key, kind)?)
        }
    }

    fn immediate_for(
        &self,
        tally: &Tally,
        subject: &Subject,
        at: DateTime<Utc>,
    ) -> Result<Vec<Announcement>, DatabaseError> {
        let Some(counts) = tally.get(subject) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for tier in immediate_tiers(counts, &self.thresholds) {
            if self.claim(subject, tally.period, tier.as_str(), at)? {
                out.push(self.render(subject, tally.period, tier, counts));
            }
        }
        Ok(out)
    }

    /// Threshold check for one subject right after one of its votes.
    pub fn check_immediate(
        &self,
        subject: &Subject,
        day: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<Vec<Announcement>, DatabaseError> {
        let tally = self.aggregator.tally_for(Period::day(day))?;
        self.immediate_for(&tally, subject, at)
    }

    /// Immediate check for every subject (used once at startup).
    pub fn check_all_immediate(
        &self,
        day: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<Vec<Announcement>, DatabaseError> {
        let tally = self.aggregator.tally_for(Period::day(day))?;
        let mut out = Vec::new();
        for subject in self.aggregator.subjects().iter() {
            out.extend(self.immediate_for(&tally, subject, at)?);
        }
        Ok(out)
    }

    /// Daily rollover for `day`: one tier per subject that received votes.
    pub fn rollover_daily(
        &self,
        day: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<Vec<Announcement>, DatabaseError> {
        let tally = self.aggregator.tally_for(Period::day(day))?;
        let mut out = Vec::new();
        for entry in &tally.subjects {
            let Some(tier) = rollover_tier(entry.counts, &self.thresholds) else {
                continue;
            };
            if self.claim(&entry.subject, tally.period, ROLLOVER_KIND, at)? {
                out.push(self.render(&entry.subject, tally.period, tier, entry.counts));
            }
        }
        Ok(out)
    }

    /// Monthly rollover. Acts only when `today` is the first of a month and
    /// then announces the month that just ended; any other day does nothing.
    pub fn rollover_monthly(
        &self,
        today: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<Vec<Announcement>, DatabaseError> {
        if today.day() != 1 {
            return Ok(Vec::new());
        }
        let tally = self.aggregator.tally_for(Period::month_before(today))?;
        let mut out = Vec::new();
        for entry in &tally.subjects {
            for tier in monthly_tiers(entry.counts, &self.thresholds) {
                if self.claim(&entry.subject, tally.period, tier.as_str(), at)? {
                    out.push(self.render(&entry.subject, tally.period, tier, entry.counts));
                }
            }
        }
        Ok(out)
    }
}
