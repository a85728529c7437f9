//! Threshold-driven announcements and their delivery.

mod delivery;
mod engine;
mod tier;

pub use delivery::{deliver, dispatch, DeliveryOutcome};
pub use engine::{render_template, Announcement, AnnouncementEngine};
pub use tier::{immediate_tiers, monthly_tiers, rollover_tier, Tier};
