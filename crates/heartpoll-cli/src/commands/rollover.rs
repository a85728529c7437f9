use chrono::{Days, Utc};
use clap::{Args, Subcommand};
use heartpoll_core::{AnnouncementEngine, Pipeline};

use super::{open, parse_date, print_json, CmdResult};

#[derive(Args)]
pub struct RolloverArgs {
    /// Date (YYYY-MM-DD)
    #[arg(long)]
    date: Option<String>,
    /// Mark the printed announcements as announced
    #[arg(long)]
    commit: bool,
}

#[derive(Subcommand)]
pub enum RolloverAction {
    /// Daily rollover for a completed day (default: yesterday)
    Daily(RolloverArgs),
    /// Monthly rollover as run on a date (default: today); acts only on the 1st
    Monthly(RolloverArgs),
}

pub fn run(action: RolloverAction) -> CmdResult {
    let (config, db) = open()?;
    let pipeline = Pipeline::new(db.clone(), &config)?;
    let now = Utc::now();
    let today = pipeline.today(now);

    let mut engine = AnnouncementEngine::new(
        db,
        config.subject_set()?,
        config.thresholds.clone(),
        config.tiers.clone(),
    );

    let announcements = match action {
        RolloverAction::Daily(args) => {
            if !args.commit {
                engine = engine.preview();
            }
            let day = match args.date {
                Some(raw) => parse_date(&raw)?,
                None => today
                    .checked_sub_days(Days::new(1))
                    .ok_or("no day before today")?,
            };
            engine.rollover_daily(day, now)?
        }
        RolloverAction::Monthly(args) => {
            if !args.commit {
                engine = engine.preview();
            }
            let date = match args.date {
                Some(raw) => parse_date(&raw)?,
                None => today,
            };
            engine.rollover_monthly(date, now)?
        }
    };
    print_json(&announcements)
}
