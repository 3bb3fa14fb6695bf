//! Telegram channel: long-poll getUpdates (or webhook updates), mapped to engine events,
//! and replies via sendMessage.

use crate::engine::{Conversation, ConversationKind, InboundEvent, MessageType, SendError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
/// sendMessage rejects longer texts.
const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram update payload (getUpdates result item or webhook POST body).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    #[serde(default)]
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    /// Unix seconds.
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl TelegramUser {
    fn display_name(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| self.first_name.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    /// "private", "group", "supergroup" or "channel".
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Entity offsets and lengths are in UTF-16 code units.
#[derive(Debug, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
    #[serde(default)]
    pub user: Option<TelegramUser>,
}

/// The bot's own account, from getMe.
#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    pub username: String,
}

/// Telegram channel connector: long-polls for updates and sends replies via sendMessage.
pub struct TelegramChannel {
    token: Option<String>,
    api_base: String,
    running: AtomicBool,
    identity: OnceLock<BotIdentity>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            api_base: telegram_api_base(),
            running: AtomicBool::new(false),
            identity: OnceLock::new(),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Use a known identity instead of calling getMe.
    pub fn set_identity(&self, identity: BotIdentity) {
        let _ = self.identity.set(identity);
    }

    fn method_url(&self, method: &str) -> Result<String, String> {
        let token = self
            .token
            .as_ref()
            .ok_or("telegram bot token not configured")?;
        Ok(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    /// Call getMe and remember who the bot is; needed to detect mentions and own messages.
    pub async fn identify(&self) -> Result<BotIdentity, String> {
        if let Some(identity) = self.identity.get() {
            return Ok(identity.clone());
        }
        let url = self.method_url("getMe")?;
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("getMe failed: {} {}", status, body));
        }
        let data: ApiResponse<BotIdentity> = res.json().await.map_err(|e| e.to_string())?;
        let identity = match (data.ok, data.result) {
            (true, Some(identity)) => identity,
            _ => {
                return Err(format!(
                    "getMe returned ok: false ({})",
                    data.description.unwrap_or_default()
                ))
            }
        };
        log::info!("telegram: logged in as @{}", identity.username);
        self.set_identity(identity.clone());
        Ok(identity)
    }

    /// Start the getUpdates long-poll loop and forward events to the engine. Returns a handle to await on shutdown.
    pub fn start_inbound(self: Arc<Self>, events_tx: mpsc::Sender<InboundEvent>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, events_tx).await;
        })
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), String> {
        let mut url = format!("{}?timeout={}", self.method_url("getUpdates")?, LONG_POLL_TIMEOUT);
        if let Some(off) = offset {
            url = format!("{}&offset={}", url, off);
        }
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("getUpdates failed: {} {}", status, body));
        }
        let data: ApiResponse<Vec<TelegramUpdate>> = res.json().await.map_err(|e| e.to_string())?;
        if !data.ok {
            return Err("getUpdates returned ok: false".to_string());
        }
        let updates = data.result.unwrap_or_default();
        let next_offset = updates.iter().map(|u| u.update_id).max().map(|id| id + 1);
        Ok((updates, next_offset))
    }

    /// Set webhook URL (and optional secret). When set, Telegram POSTs updates to the URL instead of getUpdates.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), String> {
        let mut body = serde_json::json!({ "url": url });
        if let Some(s) = secret {
            body["secret_token"] = serde_json::Value::String(s.to_string());
        }
        self.post("setWebhook", &body).await
    }

    /// Remove webhook so the bot can use getUpdates again.
    pub async fn delete_webhook(&self) -> Result<(), String> {
        self.post("deleteWebhook", &serde_json::json!({})).await
    }

    /// Send a text message to a chat via sendMessage, split into several messages when too long.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), String> {
        for part in split_message(text, MAX_MESSAGE_CHARS) {
            let body = serde_json::json!({ "chat_id": chat_id, "text": part });
            self.post("sendMessage", &body).await?;
        }
        Ok(())
    }

    async fn post(&self, method: &str, body: &serde_json::Value) -> Result<(), String> {
        let url = self.method_url(method)?;
        let res = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("{} failed: {} {}", method, status, body));
        }
        Ok(())
    }

    /// Map an update to an engine event. None for non-message updates, channel posts, or
    /// before the bot identity is known.
    pub fn inbound_event(self: &Arc<Self>, update: &TelegramUpdate) -> Option<InboundEvent> {
        let bot = self.identity.get()?;
        let msg = update.message.as_ref()?;
        let kind = match msg.chat.kind.as_str() {
            "private" => ConversationKind::Direct,
            "group" | "supergroup" => ConversationKind::Group {
                topic: msg.chat.title.clone().unwrap_or_default(),
            },
            other => {
                log::debug!("telegram: ignoring update from chat type {:?}", other);
                return None;
            }
        };
        let sent_at = DateTime::<Utc>::from_timestamp(msg.date, 0)?;
        let (sender_id, sender_name) = msg
            .from
            .as_ref()
            .map(|u| (u.id.to_string(), u.display_name()))
            .unwrap_or_default();
        let is_self = msg.from.as_ref().is_some_and(|u| u.id == bot.id);
        let (text, message_type) = match &msg.text {
            Some(t) => (t.clone(), MessageType::Text),
            None => (String::new(), MessageType::Other),
        };
        let mentions_bot = mentions(bot, &text, &msg.entities);
        let conversation = Arc::new(TelegramConversation {
            channel: self.clone(),
            chat_id: msg.chat.id.to_string(),
            group: kind.is_group(),
        });
        Some(InboundEvent {
            sent_at,
            sender_id,
            sender_name,
            recipient_id: bot.id.to_string(),
            recipient_name: bot.username.clone(),
            text,
            kind,
            is_self,
            mentions_bot,
            message_type,
            conversation,
        })
    }
}

/// True if any entity is `@<bot username>` or a text mention of the bot's user.
fn mentions(bot: &BotIdentity, text: &str, entities: &[MessageEntity]) -> bool {
    let handle = format!("@{}", bot.username);
    entities.iter().any(|e| match e.kind.as_str() {
        "mention" => entity_text(text, e.offset, e.length)
            .is_some_and(|t| t.eq_ignore_ascii_case(&handle)),
        "text_mention" => e.user.as_ref().is_some_and(|u| u.id == bot.id),
        _ => false,
    })
}

fn entity_text(text: &str, offset: usize, length: usize) -> Option<String> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let end = offset.checked_add(length)?;
    units.get(offset..end).map(String::from_utf16_lossy)
}

fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect())
        .collect()
}

/// A Telegram chat as seen by the engine.
pub struct TelegramConversation {
    channel: Arc<TelegramChannel>,
    chat_id: String,
    group: bool,
}

#[async_trait]
impl Conversation for TelegramConversation {
    fn id(&self) -> &str {
        &self.chat_id
    }

    fn is_group(&self) -> bool {
        self.group
    }

    async fn send(&self, text: &str) -> Result<(), SendError> {
        self.channel
            .send_message(&self.chat_id, text)
            .await
            .map_err(SendError::Transport)
    }
}

async fn run_get_updates_loop(channel: Arc<TelegramChannel>, events_tx: mpsc::Sender<InboundEvent>) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        match channel.get_updates(offset).await {
            Ok((updates, next)) => {
                offset = next.or(offset);
                for u in updates {
                    let Some(event) = channel.inbound_event(&u) else {
                        continue;
                    };
                    if events_tx.send(event).await.is_err() {
                        log::debug!("telegram: engine channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::debug!("telegram getUpdates error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

/// Resolve Telegram bot API base URL (for tests or custom endpoints).
pub fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE")
        .ok()
        .map(|s| s.trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| TELEGRAM_API_BASE.to_string())
}
