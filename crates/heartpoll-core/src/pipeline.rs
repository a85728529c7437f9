//! Wires the store, intake, engine and scheduler from a [`Config`].

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::sync::Arc;

use crate::announce::{dispatch, Announcement, AnnouncementEngine, DeliveryOutcome};
use crate::error::{ConfigError, CoreError, DatabaseError};
use crate::integrations::Broadcaster;
use crate::scheduler::Scheduler;
use crate::stats::Aggregator;
use crate::storage::{Config, VoteStore};
use crate::vote::{SpamGate, VoteIntake};

/// Job-ledger key of the daily rollover.
pub const DAILY_ROLLOVER_JOB: &str = "daily_rollover";
/// Job-ledger key of the monthly rollover.
pub const MONTHLY_ROLLOVER_JOB: &str = "monthly_rollover";

pub struct Pipeline {
    store: Arc<dyn VoteStore>,
    offset: FixedOffset,
    intake: VoteIntake,
    engine: Arc<AnnouncementEngine>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn VoteStore>, config: &Config) -> Result<Self, ConfigError> {
        Self::build(store, config, true)
    }

    /// Pipeline whose engine only reads announced markers. Votes are still
    /// stored; announcements are reported without being claimed, so the bot
    /// still sends them later.
    pub fn preview(store: Arc<dyn VoteStore>, config: &Config) -> Result<Self, ConfigError> {
        Self::build(store, config, false)
    }

    fn build(store: Arc<dyn VoteStore>, config: &Config, commit: bool) -> Result<Self, ConfigError> {
        let subjects = config.subject_set()?;
        let offset = config.utc_offset()?;
        let mut engine = AnnouncementEngine::new(
            store.clone(),
            subjects.clone(),
            config.thresholds.clone(),
            config.tiers.clone(),
        );
        if !commit {
            engine = engine.preview();
        }
        let engine = Arc::new(engine);
        let gate = SpamGate::new(store.clone(), config.cooldown());
        let intake = VoteIntake::new(gate, subjects, offset, engine.clone());
        Ok(Self {
            store,
            offset,
            intake,
            engine,
        })
    }

    pub fn store(&self) -> &Arc<dyn VoteStore> {
        &self.store
    }

    pub fn intake(&self) -> &VoteIntake {
        &self.intake
    }

    pub fn engine(&self) -> &Arc<AnnouncementEngine> {
        &self.engine
    }

    pub fn aggregator(&self) -> &Aggregator {
        self.engine.aggregator()
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Local calendar date of `now` in the reference timezone.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Immediate threshold check for every subject, run once at startup.
    pub fn startup_sweep(&self, now: DateTime<Utc>) -> Result<Vec<Announcement>, DatabaseError> {
        self.engine.check_all_immediate(self.today(now), now)
    }

    /// Scheduler with the daily and monthly rollover jobs registered. Both
    /// deliver their announcements to `channel_id`.
    pub fn scheduler(
        &self,
        config: &Config,
        broadcaster: Arc<dyn Broadcaster>,
        channel_id: i64,
    ) -> Result<Scheduler, ConfigError> {
        let mut scheduler = Scheduler::new(self.store.clone(), self.offset);

        let engine = self.engine.clone();
        let daily_out = broadcaster.clone();
        scheduler.schedule(DAILY_ROLLOVER_JOB, config.daily_rollover_at()?, move |today| {
            let engine = engine.clone();
            let out = daily_out.clone();
            async move {
                let day = today
                    .pred_opt()
                    .ok_or_else(|| CoreError::Custom(format!("no day before {today}")))?;
                let announcements = engine.rollover_daily(day, Utc::now())?;
                tracing::info!(%day, count = announcements.len(), "daily rollover computed");
                deliver_all(out, channel_id, announcements).await;
                Ok(())
            }
        });

        let engine = self.engine.clone();
        scheduler.schedule(MONTHLY_ROLLOVER_JOB, config.monthly_rollover_at()?, move |today| {
            let engine = engine.clone();
            let out = broadcaster.clone();
            async move {
                let announcements = engine.rollover_monthly(today, Utc::now())?;
                if !announcements.is_empty() {
                    tracing::info!(%today, count = announcements.len(), "monthly rollover computed");
                }
                deliver_all(out, channel_id, announcements).await;
                Ok(())
            }
        });

        Ok(scheduler)
    }
}

/// Dispatch and wait for every delivery. Used from job tasks, which may
/// block on the network without holding up anything else.
async fn deliver_all(
    broadcaster: Arc<dyn Broadcaster>,
    channel_id: i64,
    announcements: Vec<Announcement>,
) {
    let mut failed = 0usize;
    for handle in dispatch(broadcaster, channel_id, announcements) {
        match handle.await {
            Ok(DeliveryOutcome::Failed) => failed += 1,
            Ok(_) => {}
            Err(e) => {
                tracing::error!("delivery task panicked: {e}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        tracing::warn!(failed, "some rollover announcements were dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::Tier;
    use crate::error::BroadcastError;
    use crate::integrations::BroadcastFuture;
    use crate::storage::Database;
    use crate::vote::{Polarity, Vote, VoterId};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Sink {
        texts: Mutex<Vec<String>>,
    }

    impl Broadcaster for Sink {
        fn name(&self) -> &str {
            "sink"
        }

        fn send_text<'a>(&'a self, _channel_id: i64, text: &'a str) -> BroadcastFuture<'a> {
            Box::pin(async move {
                self.texts.lock().unwrap().push(text.to_string());
                Ok(())
            })
        }

        fn send_photo<'a>(
            &'a self,
            _channel_id: i64,
            _asset: &'a str,
            _caption: &'a str,
        ) -> BroadcastFuture<'a> {
            Box::pin(async move {
                Err(BroadcastError::Api {
                    method: "sendPhoto".into(),
                    description: "unsupported".into(),
                })
            })
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed(db: &Database, subject: &str, polarity: Polarity, n: i64, on: NaiveDate) {
        let subjects = Config::default().subject_set().unwrap();
        for voter in 0..n {
            db.append_vote(&Vote {
                voter_id: VoterId(voter),
                subject: subjects.resolve(subject).unwrap().clone(),
                polarity,
                day: on,
            })
            .unwrap();
        }
    }

    #[test]
    fn startup_sweep_announces_crossed_thresholds_once() {
        let db = Arc::new(Database::open_memory().unwrap());
        let pipeline = Pipeline::new(db.clone(), &Config::default()).unwrap();
        let now = day(2026, 7, 3).and_hms_opt(12, 0, 0).unwrap().and_utc();
        seed(&db, "Katya", Polarity::Negative, 4, day(2026, 7, 3));

        let first = pipeline.startup_sweep(now).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].tier, Tier::Not);
        assert!(pipeline.startup_sweep(now).unwrap().is_empty());
    }

    #[test]
    fn preview_intake_leaves_announcement_for_the_bot() {
        let db = Arc::new(Database::open_memory().unwrap());
        let config = Config::default();
        let offline = Pipeline::preview(db.clone(), &config).unwrap();
        let at = day(2026, 7, 3).and_hms_opt(12, 0, 0).unwrap().and_utc();

        let mut printed = Vec::new();
        for voter in 1..=4 {
            let outcome = offline
                .intake()
                .submit(&crate::events::VoteEvent {
                    voter_id: VoterId(voter),
                    subject: "Alen".into(),
                    polarity: "positive".into(),
                    received_at: at,
                })
                .unwrap();
            if let crate::vote::IntakeOutcome::Accepted { announcements, .. } = outcome {
                printed.extend(announcements);
            }
        }
        assert_eq!(printed.len(), 1);
        assert_eq!(db.vote_count().unwrap(), 4);

        let bot = Pipeline::new(db, &config).unwrap();
        let sweep = bot.startup_sweep(at).unwrap();
        assert_eq!(sweep.len(), 1);
        assert_eq!(sweep[0].tier, Tier::Super);
    }

    #[tokio::test]
    async fn daily_job_announces_previous_day() {
        let db = Arc::new(Database::open_memory().unwrap());
        let config = Config::default();
        let pipeline = Pipeline::new(db.clone(), &config).unwrap();
        seed(&db, "Alen", Polarity::Positive, 2, day(2026, 7, 2));
        seed(&db, "Kuzya", Polarity::Positive, 9, day(2026, 7, 3));

        let sink = Arc::new(Sink::default());
        let scheduler = pipeline.scheduler(&config, sink.clone(), -1).unwrap();
        let now = day(2026, 7, 3).and_hms_opt(0, 15, 0).unwrap().and_utc();
        for handle in scheduler.tick(now) {
            handle.await.unwrap();
        }

        let texts = sink.texts.lock().unwrap().clone();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("Alen"));
        assert_eq!(
            db.last_fired(DAILY_ROLLOVER_JOB).unwrap(),
            Some(day(2026, 7, 3))
        );
        assert_eq!(
            db.last_fired(MONTHLY_ROLLOVER_JOB).unwrap(),
            Some(day(2026, 7, 3))
        );
    }

    #[tokio::test]
    async fn monthly_job_acts_on_the_first() {
        let db = Arc::new(Database::open_memory().unwrap());
        let config = Config::default();
        let pipeline = Pipeline::new(db.clone(), &config).unwrap();
        seed(&db, "Kuzya", Polarity::Negative, 50, day(2026, 6, 30));

        let sink = Arc::new(Sink::default());
        let scheduler = pipeline.scheduler(&config, sink.clone(), -1).unwrap();
        let now = day(2026, 7, 1).and_hms_opt(0, 30, 0).unwrap().and_utc();
        for handle in scheduler.tick(now) {
            handle.await.unwrap();
        }

        let texts = sink.texts.lock().unwrap().clone();
        // Daily rollover for June 30 (Not) plus the monthly Loser.
        assert_eq!(texts.len(), 2);
        assert!(db
            .is_announced(
                Config::default().subject_set().unwrap().resolve("Kuzya").unwrap(),
                "2026-06",
                "loser"
            )
            .unwrap());
    }
}
