//! # Heartpoll Core Library
//!
//! Core logic for heartpoll, a chat bot that collects daily sentiment votes
//! (positive or negative) for a small fixed set of subjects and announces
//! standout subjects to a broadcast channel.
//!
//! All operations are available through the `heartpoll` CLI binary; the bot
//! runner is one command of it.
//!
//! ## Architecture
//!
//! - **Intake**: validates a vote, applies the per-voter cooldown and
//!   appends to the ledger in one storage transaction
//! - **Storage**: SQLite vote ledger, cooldown table, announced markers and
//!   job ledger behind the [`VoteStore`] trait; TOML configuration
//! - **Aggregation**: per-subject tallies for a day or a month
//! - **Announcements**: tier classification with at-most-once markers and
//!   delivery with a single text fallback
//! - **Scheduler**: daily and monthly rollovers at configured local times
//!
//! ## Key Components
//!
//! - [`VoteIntake`]: boundary for inbound votes
//! - [`SpamGate`]: cooldown rule
//! - [`Aggregator`]: tally computation
//! - [`AnnouncementEngine`]: immediate and rollover announcements
//! - [`Scheduler`]: persisted once-per-day job runner
//! - [`Bot`]: long-polling Telegram runner

pub mod announce;
pub mod bot;
pub mod error;
pub mod events;
pub mod integrations;
pub mod pipeline;
pub mod scheduler;
pub mod stats;
pub mod storage;
pub mod vote;

pub use announce::{Announcement, AnnouncementEngine, DeliveryOutcome, Tier};
pub use bot::Bot;
pub use error::{BroadcastError, ConfigError, CoreError, DatabaseError, Result};
pub use events::{Inbound, VoteEvent};
pub use integrations::{Broadcaster, TelegramClient};
pub use pipeline::Pipeline;
pub use scheduler::Scheduler;
pub use stats::{Aggregator, Counts, Period, Tally};
pub use storage::{Config, Database, VoteStore};
pub use vote::{IntakeOutcome, Polarity, SpamGate, Subject, SubjectSet, Vote, VoteIntake, VoterId};
