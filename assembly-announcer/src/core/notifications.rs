/*!
Answers to inbound notifications
*/

use tracing::{debug, error, info};

use crate::core::mastodon::{Notification, SocialClient, Toot, Visibility};

/// Notifications fetched per run
pub const NOTIFICATION_LIMIT: u32 = 40;

pub const FOLLOW_REPLY: &str = "Vielen Dank für das Interesse. 🤗";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationSummary {
    pub replied: usize,
    pub favourited: usize,
    pub ignored: usize,
}

/// Thank new followers, favourite mentions, then clear the inbox.
/// Failures are logged and the affected notification is left alone.
pub async fn reply_notifications<C: SocialClient + ?Sized>(client: &C, limit: u32) -> NotificationSummary {
    let mut summary = NotificationSummary::default();

    match client.notifications(limit).await {
        Ok(notifications) => {
            for notification in &notifications {
                debug!(
                    "Notification {} {} from {}",
                    notification.id, notification.kind, notification.account.acct
                );

                if notification.account.bot {
                    summary.ignored += 1;
                    continue;
                }

                let handled = match notification.kind.as_str() {
                    "follow" => send_reply(client, notification, FOLLOW_REPLY).await,
                    "mention" => favourite(client, notification).await,
                    _ => false,
                };

                match (handled, notification.kind.as_str()) {
                    (true, "follow") => summary.replied += 1,
                    (true, _) => summary.favourited += 1,
                    (false, _) => summary.ignored += 1,
                }
            }
        }
        Err(e) => error!("Failed to fetch notifications: {}", e),
    }

    if let Err(e) = client.clear_notifications().await {
        error!("Failed to clear notifications: {}", e);
    }

    summary
}

async fn favourite<C: SocialClient + ?Sized>(client: &C, notification: &Notification) -> bool {
    let Some(status) = &notification.status else {
        return false;
    };

    match client.favourite(&status.id).await {
        Ok(favourited) => {
            info!("⭐ Favourited status {} by {}", favourited.id, favourited.account.acct);
            true
        }
        Err(e) => {
            error!("Failed to favourite status {}: {}", status.id, e);
            false
        }
    }
}

/// Direct reply to the notifying account. The notification is dismissed
/// only when the reply went out.
async fn send_reply<C: SocialClient + ?Sized>(client: &C, notification: &Notification, text: &str) -> bool {
    let mut toot = Toot::new(
        format!("@{} {}", notification.account.acct, text),
        Visibility::Direct,
    );
    toot.in_reply_to_id = notification
        .status
        .as_ref()
        .map(|status| status.id.clone())
        .filter(|id| !id.is_empty());

    if let Err(e) = client.post_status(&toot).await {
        error!("Failed to reply to {}: {}", notification.account.acct, e);
        return false;
    }

    if let Err(e) = client.dismiss_notification(&notification.id).await {
        error!("Failed to dismiss notification {}: {}", notification.id, e);
    }

    info!("💬 Replied to {}", notification.account.acct);
    true
}
