//! SQLite-backed vote ledger.
//!
//! Provides persistent storage for:
//! - The append-only `votes` ledger
//! - Per-voter cooldown instants (`last_vote`)
//! - Announced markers and the scheduler's last-fired dates

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{data_dir, migrations, Admission, VoteStore};
use crate::error::DatabaseError;
use crate::vote::{subject_from_storage, Polarity, Subject, Vote, VoterId};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// SQLite database shared by the intake and scheduler tasks.
///
/// The connection sits behind a mutex so one `Arc<Database>` can be handed
/// to both.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `<data_dir>/heartpoll.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let dir = data_dir()?;
        Self::open_at(&dir.join("heartpoll.db"))
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        Ok(self.conn.lock()?)
    }

    /// Number of rows in the ledger.
    pub fn vote_count(&self) -> Result<u64, DatabaseError> {
        let conn = self.lock()?;
        let count = conn.query_row("SELECT COUNT(*) FROM votes", [], |row| row.get::<_, u64>(0))?;
        Ok(count)
    }

    fn query_votes(
        conn: &Connection,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<Vote>, DatabaseError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut votes = Vec::new();
        for row in rows {
            let (voter_id, subject, polarity, day) = row?;
            let polarity = polarity
                .parse::<Polarity>()
                .map_err(|e| DatabaseError::CorruptRow {
                    table: "votes",
                    message: e.to_string(),
                })?;
            let day = NaiveDate::parse_from_str(&day, DAY_FORMAT).map_err(|e| {
                DatabaseError::CorruptRow {
                    table: "votes",
                    message: format!("bad day '{day}': {e}"),
                }
            })?;
            votes.push(Vote {
                voter_id: VoterId(voter_id),
                subject: subject_from_storage(subject),
                polarity,
                day,
            });
        }
        Ok(votes)
    }

    fn insert_vote(conn: &Connection, vote: &Vote) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO votes (voter_id, subject, polarity, day) VALUES (?1, ?2, ?3, ?4)",
            params![
                vote.voter_id.0,
                vote.subject.name(),
                vote.polarity.as_str(),
                vote.day.format(DAY_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }
}

fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, end))
}

impl VoteStore for Database {
    fn append_vote(&self, vote: &Vote) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        Self::insert_vote(&conn, vote)?;
        Ok(())
    }

    fn votes_on(&self, day: NaiveDate) -> Result<Vec<Vote>, DatabaseError> {
        let conn = self.lock()?;
        Self::query_votes(
            &conn,
            "SELECT voter_id, subject, polarity, day FROM votes WHERE day = ?1",
            params![day.format(DAY_FORMAT).to_string()],
        )
    }

    fn votes_in_month(&self, year: i32, month: u32) -> Result<Vec<Vote>, DatabaseError> {
        let Some((start, end)) = month_bounds(year, month) else {
            return Ok(Vec::new());
        };
        let conn = self.lock()?;
        Self::query_votes(
            &conn,
            "SELECT voter_id, subject, polarity, day FROM votes WHERE day >= ?1 AND day < ?2",
            params![
                start.format(DAY_FORMAT).to_string(),
                end.format(DAY_FORMAT).to_string()
            ],
        )
    }

    fn last_vote_at(&self, voter: VoterId) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let conn = self.lock()?;
        let ms = conn
            .query_row(
                "SELECT timestamp FROM last_vote WHERE voter_id = ?1",
                params![voter.0],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(ms.and_then(DateTime::from_timestamp_millis))
    }

    fn admit_vote(
        &self,
        vote: &Vote,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Admission, DatabaseError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        // Compare-and-set: only claims the slot when the window has elapsed.
        let claimed = tx.execute(
            "INSERT INTO last_vote (voter_id, timestamp) VALUES (?1, ?2)
             ON CONFLICT(voter_id) DO UPDATE SET timestamp = excluded.timestamp
             WHERE excluded.timestamp - last_vote.timestamp >= ?3",
            params![vote.voter_id.0, now.timestamp_millis(), cooldown.num_milliseconds()],
        )?;

        if claimed == 0 {
            let last_ms: i64 = tx.query_row(
                "SELECT timestamp FROM last_vote WHERE voter_id = ?1",
                params![vote.voter_id.0],
                |row| row.get(0),
            )?;
            tx.rollback()?;
            let last_vote_at = DateTime::from_timestamp_millis(last_ms).ok_or_else(|| {
                DatabaseError::CorruptRow {
                    table: "last_vote",
                    message: format!("timestamp {last_ms} out of range"),
                }
            })?;
            return Ok(Admission::CoolingDown { last_vote_at });
        }

        Self::insert_vote(&tx, vote)?;
        tx.commit()?;
        Ok(Admission::Accepted)
    }

    fn mark_announced(
        &self,
        subject: &Subject,
        period: &str,
        kind: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO announcements (subject, period, kind, announced_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![subject.name(), period, kind, at.to_rfc3339()],
        )?;
        Ok(inserted == 1)
    }

    fn is_announced(
        &self,
        subject: &Subject,
        period: &str,
        kind: &str,
    ) -> Result<bool, DatabaseError> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM announcements WHERE subject = ?1 AND period = ?2 AND kind = ?3",
                params![subject.name(), period, kind],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn last_fired(&self, job: &str) -> Result<Option<NaiveDate>, DatabaseError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT last_fired_on FROM job_runs WHERE job = ?1",
                params![job],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        raw.map(|s| {
            NaiveDate::parse_from_str(&s, DAY_FORMAT).map_err(|e| DatabaseError::CorruptRow {
                table: "job_runs",
                message: format!("bad date '{s}': {e}"),
            })
        })
        .transpose()
    }

    fn record_fired(&self, job: &str, on: NaiveDate) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO job_runs (job, last_fired_on) VALUES (?1, ?2)",
            params![job, on.format(DAY_FORMAT).to_string()],
        )?;
        Ok(())
    }
}
