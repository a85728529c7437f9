use chrono::{DateTime, Utc};
use clap::Subcommand;
use heartpoll_core::{Pipeline, VoteEvent, VoterId};

use super::{open, print_json, CmdResult};

#[derive(Subcommand)]
pub enum VoteAction {
    /// Submit one vote as if it came from the chat. Announcements it
    /// triggers are printed, not sent, and stay pending for the bot unless
    /// `--commit` marks them announced.
    Cast {
        /// Voter id
        #[arg(long)]
        voter: i64,
        /// Subject name
        #[arg(long)]
        subject: String,
        /// positive or negative
        #[arg(long)]
        polarity: String,
        /// Receive time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,
        /// Mark printed announcements as announced
        #[arg(long)]
        commit: bool,
    },
}

pub fn run(action: VoteAction) -> CmdResult {
    match action {
        VoteAction::Cast {
            voter,
            subject,
            polarity,
            at,
            commit,
        } => {
            let (config, db) = open()?;
            let pipeline = if commit {
                Pipeline::new(db, &config)?
            } else {
                Pipeline::preview(db, &config)?
            };
            let received_at = match at {
                Some(raw) => DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| format!("invalid --at '{raw}': {e}"))?
                    .with_timezone(&Utc),
                None => Utc::now(),
            };
            let outcome = pipeline.intake().submit(&VoteEvent {
                voter_id: VoterId(voter),
                subject,
                polarity,
                received_at,
            })?;
            print_json(&outcome)?;
        }
    }
    Ok(())
}
