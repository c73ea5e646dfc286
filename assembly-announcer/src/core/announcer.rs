/*!
Posting of upcoming events
*/

use assembly_database::{Event, EventStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};

use crate::core::{
    mastodon::{SocialClient, Toot, Visibility},
    status::StatusComposer,
};

/// Only events starting within this window are announced
pub fn announce_horizon() -> Duration {
    Duration::hours(8)
}

/// How long before the start an announcement is published
pub fn schedule_lead() -> Duration {
    Duration::hours(6)
}

/// Mastodon rejects scheduling closer than this; such statuses are posted at once
pub fn min_schedule_offset() -> Duration {
    Duration::minutes(5)
}

/// Outcome of one posting pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostSummary {
    pub posted: usize,
    /// Already announced under another id or start time
    pub duplicates: usize,
    /// No usable start time
    pub skipped: usize,
    pub failed: usize,
}

/// Status for an event, scheduled `schedule_lead()` before its start
pub fn announcement(event: &Event, composer: &StatusComposer, now: DateTime<Utc>) -> Toot {
    let mut toot = Toot::new(composer.compose(event), Visibility::Public);
    let publish_at = event.start - schedule_lead();
    if publish_at > now + min_schedule_offset() {
        toot.scheduled_at = Some(publish_at);
    }
    toot
}

/// Post every pending event, one at a time, until none is left.
///
/// Posting failures are stored on the row and never retried. Store failures
/// abort the pass since the row could not be taken out of the queue.
pub async fn send_upcoming<C: SocialClient + ?Sized>(
    store: &EventStore,
    client: &C,
    composer: &StatusComposer,
    now: DateTime<Utc>,
) -> Result<PostSummary, StoreError> {
    let mut summary = PostSummary::default();

    while let Some(event) = store.next_unsent(now, announce_horizon())? {
        if store.is_duplicate(&event)? {
            info!("♻️ Event {} already announced, skipping", event.id);
            store.mark_sent(&event, now)?;
            summary.duplicates += 1;
            continue;
        }

        if event.from.is_empty() || event.from == "00:00" {
            info!("Event {} has no start time, skipping", event.id);
            store.mark_sent(&event, now)?;
            summary.skipped += 1;
            continue;
        }

        let toot = announcement(&event, composer, now);
        match client.post_status(&toot).await {
            Ok(posted) => {
                store.mark_sent(&event, now)?;
                match posted.scheduled_at {
                    Some(at) => info!("📣 Scheduled event {} as status {} for {}", event.id, posted.id, at),
                    None => info!("📣 Sent event {} as status {}", event.id, posted.id),
                }
                summary.posted += 1;
            }
            Err(e) => {
                error!("Failed to post event {}: {}", event.id, e);
                store.mark_error(&event, &e.to_string())?;
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}
