//! Database schema migrations for heartpoll.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Schema version after all migrations have run.
pub const CURRENT_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (fresh database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!("failed to read schema_version: {e}");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: the vote ledger and the per-voter cooldown table.
///
/// `votes` is append-only. `last_vote.timestamp` holds epoch milliseconds.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS votes (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            voter_id  INTEGER NOT NULL,
            subject   TEXT NOT NULL,
            polarity  TEXT NOT NULL CHECK (polarity IN ('positive', 'negative')),
            day       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_votes_day ON votes(day);

        CREATE TABLE IF NOT EXISTS last_vote (
            voter_id  INTEGER PRIMARY KEY,
            timestamp INTEGER NOT NULL
        );",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: announced markers and the scheduler's last-fired ledger.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS announcements (
            subject      TEXT NOT NULL,
            period       TEXT NOT NULL,
            kind         TEXT NOT NULL,
            announced_at TEXT NOT NULL,
            PRIMARY KEY (subject, period, kind)
        );

        CREATE TABLE IF NOT EXISTS job_runs (
            job           TEXT PRIMARY KEY,
            last_fired_on TEXT NOT NULL
        );",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);
    }

    #[test]
    fn polarity_column_rejects_other_values() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO votes (voter_id, subject, polarity, day) VALUES (1, 'A', 'meh', '2026-01-01')",
            [],
        );
        assert!(result.is_err());
    }
}
