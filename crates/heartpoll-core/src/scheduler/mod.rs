//! Recurring-job runner.
//!
//! Jobs are registered with a time of day in the reference timezone and fire
//! at most once per local calendar date. The date a job last fired is kept
//! in the store, so a restart later in the day still catches up on a missed
//! job and a restart after it fired does not repeat it.
//!
//! Each due job runs on its own task. The tick loop never awaits a job and a
//! failing job is logged, not propagated.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::error::DatabaseError;
use crate::storage::VoteStore;

pub type JobFuture = Pin<Box<dyn Future<Output = crate::Result<()>> + Send>>;

type JobFn = Arc<dyn Fn(NaiveDate) -> JobFuture + Send + Sync>;

struct Job {
    key: String,
    at: NaiveTime,
    run: JobFn,
}

pub struct Scheduler {
    store: Arc<dyn VoteStore>,
    offset: FixedOffset,
    jobs: Vec<Job>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn VoteStore>, offset: FixedOffset) -> Self {
        Self {
            store,
            offset,
            jobs: Vec::new(),
        }
    }

    /// Register `job` under `key` to fire daily at local time `at`. The job
    /// receives the local date it fires on.
    ///
    /// `key` names the job in the persisted ledger and must be stable
    /// across restarts.
    pub fn schedule<F, Fut>(&mut self, key: impl Into<String>, at: NaiveTime, job: F)
    where
        F: Fn(NaiveDate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::Result<()>> + Send + 'static,
    {
        self.jobs.push(Job {
            key: key.into(),
            at,
            run: Arc::new(move |date| Box::pin(job(date))),
        });
    }

    pub fn job_keys(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|j| j.key.as_str())
    }

    fn is_due(&self, job: &Job, now: DateTime<FixedOffset>) -> Result<bool, DatabaseError> {
        if now.time() < job.at {
            return Ok(false);
        }
        let today = now.date_naive();
        Ok(match self.store.last_fired(&job.key)? {
            Some(last) => last < today,
            None => true,
        })
    }

    /// Evaluate every job against `now` and spawn the due ones. The firing
    /// date is recorded before the job starts, so a job that fails is not
    /// retried on the same day.
    ///
    /// Must be called from within a tokio runtime.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        let local = now.with_timezone(&self.offset);
        let today = local.date_naive();
        let mut handles = Vec::new();

        for job in &self.jobs {
            let due = self
                .is_due(job, local)
                .and_then(|due| {
                    if due {
                        self.store.record_fired(&job.key, today)?;
                    }
                    Ok(due)
                });
            match due {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::error!(job = %job.key, "failed to read job ledger: {e}");
                    continue;
                }
            }

            tracing::info!(job = %job.key, date = %today, "firing scheduled job");
            let key = job.key.clone();
            let fut = (job.run)(today);
            handles.push(tokio::spawn(async move {
                match fut.await {
                    Ok(()) => tracing::info!(job = %key, "scheduled job finished"),
                    Err(e) => tracing::error!(job = %key, "scheduled job failed: {e}"),
                }
            }));
        }
        handles
    }

    /// Tick every `tick_interval` until `shutdown` resolves.
    pub async fn run_until<S>(self, tick_interval: std::time::Duration, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            jobs = self.jobs.len(),
            tick_secs = tick_interval.as_secs(),
            "scheduler started"
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.tick(Utc::now());
                }
            }
        }
        tracing::info!("scheduler stopped");
    }

    pub async fn run_forever(self, tick_interval: std::time::Duration) {
        self.run_until(tick_interval, std::future::pending()).await
    }
}
