//! Ready-made listeners for notifications and chat messages

use std::sync::Arc;

use async_trait::async_trait;
use botsky_listener::{DispatchContext, Listener, PollContext, PollError, PollSource};
use log::{debug, error, info};
use tokio::sync::Mutex;

use crate::chat::ChatLogEntry;
use crate::notification::Notification;
use crate::Client;

pub const NOTIFICATION_LISTENER_NAME: &str = "PollingNotificationListener";
pub const CHAT_LISTENER_NAME: &str = "PollingChatListener";

pub type NotificationListener = Listener<Client, Notification>;
pub type ChatListener = Listener<Client, ChatLogEntry>;

/// Yields unread notifications and marks them as seen.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotificationPoller;

#[async_trait]
impl PollSource<Client, Notification> for NotificationPoller {
    async fn poll(
        &self,
        ctx: PollContext,
        client: Arc<Client>,
    ) -> Result<Vec<Notification>, PollError> {
        let count = client.notification_unread_count().await?;
        if count == 0 {
            return Ok(Vec::new());
        }

        info!("{}: {} new notification(s)", ctx.listener, count);
        let notifications = client.list_notifications(count).await?;
        client.update_seen_now().await?;
        Ok(notifications)
    }
}

/// Yields chat log entries since the last successful poll.
///
/// The cursor only advances when a poll succeeds, so a failed poll is retried
/// from the same position on the next cycle.
#[derive(Debug, Default)]
pub struct ChatLogPoller {
    cursor: Mutex<Option<String>>,
}

impl ChatLogPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a known cursor
    pub fn with_cursor(cursor: impl Into<String>) -> Self {
        Self {
            cursor: Mutex::new(Some(cursor.into())),
        }
    }

    pub async fn cursor(&self) -> Option<String> {
        self.cursor.lock().await.clone()
    }
}

#[async_trait]
impl PollSource<Client, ChatLogEntry> for ChatLogPoller {
    async fn poll(
        &self,
        ctx: PollContext,
        client: Arc<Client>,
    ) -> Result<Vec<ChatLogEntry>, PollError> {
        let mut cursor = self.cursor.lock().await;
        let page = client.chat_recent_logs(cursor.as_deref()).await?;
        if let Some(next) = page.cursor {
            *cursor = Some(next);
        }
        if !page.logs.is_empty() {
            debug!("{}: {} chat log entries", ctx.listener, page.logs.len());
        }
        Ok(page.logs)
    }
}

/// Listener over unread notifications
pub fn notification_listener(client: Arc<Client>) -> NotificationListener {
    Listener::new(NOTIFICATION_LISTENER_NAME, client, NotificationPoller)
}

/// Listener over the chat log
pub fn chat_listener(client: Arc<Client>) -> ChatListener {
    Listener::new(CHAT_LISTENER_NAME, client, ChatLogPoller::new())
}

/// Example handler: replies "hello :)" to every mention.
pub async fn reply_to_mentions(
    ctx: DispatchContext,
    client: Arc<Client>,
    notifications: Arc<[Notification]>,
) {
    for notification in notifications.iter().filter(|n| n.is_mention()) {
        match client.reply_text(&notification.uri, "hello :)").await {
            Ok(reply) => info!(
                "{} [{}]: replied to {} with {}",
                ctx.handler_id, ctx.dispatch_id, notification.uri, reply.uri
            ),
            Err(e) => error!(
                "{} [{}]: reply to {} failed: {}",
                ctx.handler_id, ctx.dispatch_id, notification.uri, e
            ),
        }
    }
}

/// Example handler: echoes every chat message not sent by the bot itself.
pub async fn echo_chat_messages(
    ctx: DispatchContext,
    client: Arc<Client>,
    entries: Arc<[ChatLogEntry]>,
) {
    let own_did = client.did();
    for (convo_id, message) in entries.iter().filter_map(|entry| entry.created_message()) {
        if own_did.as_deref() == Some(message.sender.did.as_str()) {
            continue;
        }

        let reply = format!("You said: '{}'", message.text);
        if let Err(e) = client.chat_send_message(convo_id, &reply).await {
            error!(
                "{} [{}]: reply in {} failed: {}",
                ctx.handler_id, ctx.dispatch_id, convo_id, e
            );
        }
    }
}
