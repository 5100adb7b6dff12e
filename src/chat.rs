//! Direct message endpoints
//!
//! Chat calls are routed through the account's PDS to the chat service via the
//! `atproto-proxy` header (see [`ClientOptions::chat_proxy`]).
//!
//! [`ClientOptions::chat_proxy`]: crate::config::ClientOptions::chat_proxy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Client;

pub const GET_LOG: &str = "chat.bsky.convo.getLog";
pub const SEND_MESSAGE: &str = "chat.bsky.convo.sendMessage";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSender {
    pub did: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub rev: String,
    pub text: String,
    pub sender: MessageSender,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMessageView {
    pub id: String,
    pub rev: String,
    pub sender: MessageSender,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "$type")]
pub enum ChatMessage {
    #[serde(rename = "chat.bsky.convo.defs#messageView")]
    View(MessageView),
    #[serde(rename = "chat.bsky.convo.defs#deletedMessageView")]
    Deleted(DeletedMessageView),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvoLog {
    pub rev: String,
    pub convo_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageLog {
    pub rev: String,
    pub convo_id: String,
    pub message: ChatMessage,
}

/// One entry of the account's chat event log.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "$type")]
pub enum ChatLogEntry {
    #[serde(rename = "chat.bsky.convo.defs#logBeginConvo")]
    BeginConvo(ConvoLog),
    #[serde(rename = "chat.bsky.convo.defs#logLeaveConvo")]
    LeaveConvo(ConvoLog),
    #[serde(rename = "chat.bsky.convo.defs#logCreateMessage")]
    CreateMessage(MessageLog),
    #[serde(rename = "chat.bsky.convo.defs#logDeleteMessage")]
    DeleteMessage(MessageLog),
    #[serde(other)]
    Unknown,
}

impl ChatLogEntry {
    pub fn convo_id(&self) -> Option<&str> {
        match self {
            ChatLogEntry::BeginConvo(log) | ChatLogEntry::LeaveConvo(log) => Some(&log.convo_id),
            ChatLogEntry::CreateMessage(log) | ChatLogEntry::DeleteMessage(log) => {
                Some(&log.convo_id)
            }
            ChatLogEntry::Unknown => None,
        }
    }

    /// The conversation and message of a newly created message.
    pub fn created_message(&self) -> Option<(&str, &MessageView)> {
        match self {
            ChatLogEntry::CreateMessage(MessageLog {
                convo_id,
                message: ChatMessage::View(message),
                ..
            }) => Some((convo_id, message)),
            _ => None,
        }
    }
}

/// Log entries after a cursor, plus the cursor to continue from.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatLogPage {
    #[serde(default)]
    pub cursor: Option<String>,
    pub logs: Vec<ChatLogEntry>,
}

#[derive(Serialize)]
struct MessageInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageInput<'a> {
    convo_id: &'a str,
    message: MessageInput<'a>,
}

impl Client {
    /// Chat log entries since `cursor`, or the recent log when `None`
    pub async fn chat_recent_logs(&self, cursor: Option<&str>) -> Result<ChatLogPage, Error> {
        self.chat_get(GET_LOG)?
            .query_opt("cursor", cursor)
            .execute()
            .await
    }

    /// Send a text message to a conversation
    pub async fn chat_send_message(&self, convo_id: &str, text: &str) -> Result<MessageView, Error> {
        self.chat_post(SEND_MESSAGE)?
            .json(&SendMessageInput {
                convo_id,
                message: MessageInput { text },
            })?
            .execute()
            .await
    }
}
