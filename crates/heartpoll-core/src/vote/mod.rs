//! Vote model, spam gate and the intake boundary.

mod intake;
mod model;
mod spam_gate;

pub use intake::{IgnoreReason, IntakeOutcome, VoteIntake};
pub(crate) use model::subject_from_storage;
pub use model::{Polarity, Subject, SubjectSet, UnknownPolarity, Vote, VoterId};
pub use spam_gate::{GateVerdict, SpamGate, DEFAULT_COOLDOWN_SECS};
