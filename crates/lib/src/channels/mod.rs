//! Messaging transports (e.g. Telegram).
//!
//! A transport turns platform updates into engine events and implements
//! `Conversation::send` for replies.

mod telegram;

pub use telegram::{
    telegram_api_base, BotIdentity, TelegramChannel, TelegramConversation, TelegramUpdate,
};
