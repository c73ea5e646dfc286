/*!
Coordinator that runs fetch, post and reply passes in sequence
*/

use std::time::Duration as StdDuration;

use assembly_database::EventStore;
use chrono::{DateTime, Days, Utc};
use tokio_stream::{StreamExt, wrappers::IntervalStream};
use tracing::{error, info, warn};

use crate::core::{
    announcer::{PostSummary, announce_horizon, send_upcoming},
    config::Settings,
    feed::{FeedClient, FeedRecord, feed_url},
    mastodon::{MastodonClient, SocialClient},
    notifications::{NOTIFICATION_LIMIT, NotificationSummary, reply_notifications},
    status::{Hashtagger, StatusComposer},
};

/// Days fetched per run, starting today
const FEED_DAYS: u64 = 2;

/// Statistics about one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records listed by the feed
    pub fetched: usize,
    /// Records that became new rows
    pub stored: usize,
    pub posts: PostSummary,
    pub notifications: NotificationSummary,
}

/// Owns every component of a run
pub struct Announcer<C: SocialClient> {
    settings: Settings,
    store: EventStore,
    feed: FeedClient,
    client: C,
    composer: StatusComposer,
}

impl Announcer<MastodonClient> {
    /// Build an announcer talking to the configured Mastodon server
    pub fn from_settings(settings: Settings) -> Result<Self, Box<dyn std::error::Error>> {
        let store = EventStore::open(settings.database_path(), settings.store_options())?;
        let client = MastodonClient::new(&settings.mastodon)?;
        Self::new(settings, store, client)
    }
}

impl<C: SocialClient> Announcer<C> {
    pub fn new(settings: Settings, store: EventStore, client: C) -> Result<Self, Box<dyn std::error::Error>> {
        let composer = StatusComposer {
            config: settings.simple_search.clone(),
            tagger: Hashtagger::new(settings.tags.as_slice())?,
            tz: settings.time_zone()?,
        };
        let feed = FeedClient::new(&settings.mastodon.user_agent);

        Ok(Self {
            settings,
            store,
            feed,
            client,
            composer,
        })
    }

    /// Fetch the feed for today and tomorrow, post pending events and answer
    /// notifications.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RunSummary, Box<dyn std::error::Error>> {
        let mut summary = RunSummary::default();
        let today = now.with_timezone(&self.composer.tz).date_naive();

        for offset in 0..FEED_DAYS {
            let Some(date) = today.checked_add_days(Days::new(offset)) else {
                continue;
            };
            let url = feed_url(&self.settings.simple_search, date);
            info!("🔍 Fetching {}", url);

            let records = match self.feed.fetch(&url).await {
                Ok(records) => records,
                Err(e) => {
                    error!("Failed to fetch {}: {}", url, e);
                    continue;
                }
            };

            summary.fetched += records.len();
            for value in records {
                if self.ingest(value, now) {
                    summary.stored += 1;
                }
            }
        }

        summary.posts = send_upcoming(&self.store, &self.client, &self.composer, now).await?;
        summary.notifications = reply_notifications(&self.client, NOTIFICATION_LIMIT).await;

        info!(
            "✅ Run complete: {} fetched, {} stored, {} posted, {} duplicates, {} skipped, {} failed",
            summary.fetched,
            summary.stored,
            summary.posts.posted,
            summary.posts.duplicates,
            summary.posts.skipped,
            summary.posts.failed
        );
        info!(
            "Notifications: {} replied, {} favourited, {} ignored",
            summary.notifications.replied, summary.notifications.favourited, summary.notifications.ignored
        );
        Ok(summary)
    }

    /// Store one feed record. Malformed records and failed inserts are
    /// logged and dropped.
    fn ingest(&self, value: serde_json::Value, now: DateTime<Utc>) -> bool {
        let event = match FeedRecord::parse(value).and_then(|record| {
            record.to_event(self.composer.tz, now, announce_horizon())
        }) {
            Ok(Some(event)) => event,
            Ok(None) => return false,
            Err(e) => {
                warn!("Skipping feed record: {}", e);
                return false;
            }
        };

        match self.store.insert(&event) {
            Ok(true) => {
                info!("Stored event {}: {}", event.id, event.subject);
                true
            }
            Ok(false) => {
                info!("… event {} not stored, already known", event.id);
                false
            }
            Err(e) => {
                error!("Failed to store event {}: {}", event.id, e);
                false
            }
        }
    }

    /// Run now and then every `interval` until `shutdown` resolves. A failed
    /// run is logged and the next one attempted. Shutdown is only observed
    /// between runs, so a post is never left without its sent marker.
    pub async fn watch<F: Future<Output = ()>>(&self, interval: StdDuration, shutdown: F) {
        let mut ticks = IntervalStream::new(tokio::time::interval(interval));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("🛑 Shutdown");
                    break;
                }
                tick = ticks.next() => {
                    if tick.is_none() {
                        break;
                    }
                    if let Err(e) = self.run_once(Utc::now()).await {
                        error!("Run failed: {}", e);
                    }
                }
            }
        }
    }
}
