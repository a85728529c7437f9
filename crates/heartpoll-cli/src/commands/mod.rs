pub mod config;
pub mod rollover;
pub mod run;
pub mod stats;
pub mod vote;

use chrono::NaiveDate;
use heartpoll_core::{Config, Database};
use std::sync::Arc;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Config from the default location plus the database in the data dir.
pub fn open() -> Result<(Config, Arc<Database>), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Arc::new(Database::open()?);
    Ok((config, db))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, Box<dyn std::error::Error>> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{raw}' (expected YYYY-MM-DD): {e}").into())
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
