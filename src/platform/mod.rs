pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::types::{ChatId, Message, MessageId};

/// Outbound operations the relay needs from the messaging platform
#[async_trait]
pub trait RelayApi: Send + Sync {
    /// Send a text reply into a chat
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;

    /// Copy message `message_id` from chat `from` into chat `to`
    async fn copy_message(&self, to: ChatId, from: ChatId, message_id: MessageId) -> Result<()>;
}

/// The parts of a command message the handlers look at
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Sender user id as string; `None` for messages sent on behalf of a chat
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub chat_id: ChatId,
    pub text: Option<String>,
}

impl CommandContext {
    pub fn from_message(msg: &Message) -> Self {
        let user = msg.from.as_ref();
        Self {
            user_id: user.map(|u| u.id.0.to_string()),
            username: user.and_then(|u| u.username.clone()),
            chat_id: msg.chat.id,
            text: msg.text().map(str::to_owned),
        }
    }

    /// Sender description for log lines, e.g. `8 (@bob)`
    pub fn sender_label(&self) -> String {
        match (&self.user_id, &self.username) {
            (Some(id), Some(name)) => format!("{} (@{})", id, name),
            (Some(id), None) => id.clone(),
            (None, Some(name)) => format!("@{}", name),
            (None, None) => "unknown".to_string(),
        }
    }
}

/// A post published in a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPost {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl ChannelPost {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            chat_id: msg.chat.id,
            message_id: msg.id,
        }
    }
}
