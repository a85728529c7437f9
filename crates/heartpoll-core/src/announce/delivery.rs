//! Delivery of announcements to the broadcast channel.
//!
//! A photo announcement that fails is retried once as plain text; a text
//! announcement that fails is retried once. After that the announcement is
//! logged and dropped.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::Announcement;
use crate::integrations::Broadcaster;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Photo,
    Text,
    /// First attempt failed, text retry succeeded.
    TextFallback,
    Failed,
}

/// Send one announcement, falling back to text once.
pub async fn deliver(
    broadcaster: &dyn Broadcaster,
    channel_id: i64,
    announcement: &Announcement,
) -> DeliveryOutcome {
    let first = match &announcement.asset {
        Some(asset) => broadcaster
            .send_photo(channel_id, asset, &announcement.text)
            .await
            .map(|()| DeliveryOutcome::Photo),
        None => broadcaster
            .send_text(channel_id, &announcement.text)
            .await
            .map(|()| DeliveryOutcome::Text),
    };

    let err = match first {
        Ok(outcome) => {
            tracing::info!(
                subject = %announcement.subject,
                tier = %announcement.tier,
                period = %announcement.period,
                "announcement delivered via {}",
                broadcaster.name()
            );
            return outcome;
        }
        Err(e) => e,
    };

    tracing::warn!(
        subject = %announcement.subject,
        tier = %announcement.tier,
        "announcement delivery failed, retrying as text: {err}"
    );
    match broadcaster.send_text(channel_id, &announcement.text).await {
        Ok(()) => DeliveryOutcome::TextFallback,
        Err(e) => {
            tracing::error!(
                subject = %announcement.subject,
                tier = %announcement.tier,
                "announcement dropped after text fallback failed: {e}"
            );
            DeliveryOutcome::Failed
        }
    }
}

/// Deliver each announcement on its own task so the caller never waits on
/// the network. Handles are returned for callers that want the outcomes.
pub fn dispatch(
    broadcaster: Arc<dyn Broadcaster>,
    channel_id: i64,
    announcements: Vec<Announcement>,
) -> Vec<JoinHandle<DeliveryOutcome>> {
    announcements
        .into_iter()
        .map(|announcement| {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move { deliver(broadcaster.as_ref(), channel_id, &announcement).await })
        })
        .collect()
}
