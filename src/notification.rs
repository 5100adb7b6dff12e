//! Notification endpoints

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Client;

pub const GET_UNREAD_COUNT: &str = "app.bsky.notification.getUnreadCount";
pub const LIST_NOTIFICATIONS: &str = "app.bsky.notification.listNotifications";
pub const UPDATE_SEEN: &str = "app.bsky.notification.updateSeen";

pub const MAX_NOTIFICATION_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub did: String,
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// URI of the record that caused the notification, e.g. the mentioning post
    pub uri: String,
    pub cid: String,
    pub author: Author,
    /// `like`, `repost`, `follow`, `mention`, `reply`, `quote`, ...
    pub reason: String,
    /// The bot's record the notification refers to, for likes and replies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_subject: Option<String>,
    pub record: serde_json::Value,
    pub is_read: bool,
    pub indexed_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_mention(&self) -> bool {
        self.reason == "mention"
    }

    pub fn is_reply(&self) -> bool {
        self.reason == "reply"
    }
}

#[derive(Debug, Deserialize)]
struct UnreadCountOutput {
    count: i64,
}

#[derive(Debug, Deserialize)]
struct ListNotificationsOutput {
    notifications: Vec<Notification>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSeenInput {
    seen_at: String,
}

impl Client {
    /// Number of unread notifications
    pub async fn notification_unread_count(&self) -> Result<i64, Error> {
        let output: UnreadCountOutput = self.get(GET_UNREAD_COUNT)?.execute().await?;
        Ok(output.count)
    }

    /// The most recent notifications, newest first. `limit` is clamped to
    /// `1..=100`.
    pub async fn list_notifications(&self, limit: i64) -> Result<Vec<Notification>, Error> {
        let limit = limit.clamp(1, MAX_NOTIFICATION_LIMIT);
        let output: ListNotificationsOutput = self
            .get(LIST_NOTIFICATIONS)?
            .query("limit", limit)
            .execute()
            .await?;
        Ok(output.notifications)
    }

    /// Mark all notifications up to now as seen
    pub async fn update_seen_now(&self) -> Result<(), Error> {
        self.update_seen(Utc::now()).await
    }

    pub async fn update_seen(&self, seen_at: DateTime<Utc>) -> Result<(), Error> {
        self.post(UPDATE_SEEN)?
            .json(&UpdateSeenInput {
                seen_at: seen_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            })?
            .execute_empty()
            .await
    }
}
