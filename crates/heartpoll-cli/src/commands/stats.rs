use chrono::Utc;
use clap::Subcommand;
use heartpoll_core::{Period, Pipeline};

use super::{open, parse_date, print_json, CmdResult};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's tally
    Today,
    /// This month's tally
    Month,
    /// Tally for a given day
    Day {
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
    },
}

pub fn run(action: StatsAction) -> CmdResult {
    let (config, db) = open()?;
    let pipeline = Pipeline::new(db, &config)?;
    let today = pipeline.today(Utc::now());

    let period = match action {
        StatsAction::Today => Period::day(today),
        StatsAction::Month => Period::month_of(today),
        StatsAction::Day { date } => Period::day(parse_date(&date)?),
    };
    let tally = pipeline.aggregator().tally_for(period)?;
    print_json(&tally)
}
