//! Inbound events and the conversation capability a transport hands to the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Where a message was received: a one-to-one chat or a group with a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationKind {
    Direct,
    Group { topic: String },
}

impl ConversationKind {
    pub fn is_group(&self) -> bool {
        matches!(self, ConversationKind::Group { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("send failed: {0}")]
    Transport(String),
}

/// Handle to the conversation an event arrived in. Replies go back through `send`.
#[async_trait]
pub trait Conversation: Send + Sync {
    /// Stable id of the conversation (e.g. Telegram chat id).
    fn id(&self) -> &str;
    fn is_group(&self) -> bool;
    async fn send(&self, text: &str) -> Result<(), SendError>;
}

/// One received message. Built by the transport and never mutated afterwards.
#[derive(Clone)]
pub struct InboundEvent {
    pub sent_at: DateTime<Utc>,
    pub sender_id: String,
    pub sender_name: String,
    pub recipient_id: String,
    /// Display name of the receiving account; group commands are addressed as `@<recipient_name>`.
    pub recipient_name: String,
    /// Raw text, untrimmed.
    pub text: String,
    pub kind: ConversationKind,
    pub is_self: bool,
    /// Only meaningful for group conversations.
    pub mentions_bot: bool,
    pub message_type: MessageType,
    pub conversation: Arc<dyn Conversation>,
}

impl fmt::Debug for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundEvent")
            .field("sent_at", &self.sent_at)
            .field("sender_id", &self.sender_id)
            .field("sender_name", &self.sender_name)
            .field("recipient_id", &self.recipient_id)
            .field("recipient_name", &self.recipient_name)
            .field("text", &self.text)
            .field("kind", &self.kind)
            .field("is_self", &self.is_self)
            .field("mentions_bot", &self.mentions_bot)
            .field("message_type", &self.message_type)
            .field("conversation", &self.conversation.id())
            .finish()
    }
}

/// Command text extracted from an eligible event, plus the conversation to answer in.
#[derive(Clone)]
pub struct Command {
    pub text: String,
    pub conversation: Arc<dyn Conversation>,
}

impl Command {
    pub fn is_group(&self) -> bool {
        self.conversation.is_group()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("text", &self.text)
            .field("conversation", &self.conversation.id())
            .finish()
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
            && self.conversation.id() == other.conversation.id()
            && self.conversation.is_group() == other.conversation.is_group()
    }
}
