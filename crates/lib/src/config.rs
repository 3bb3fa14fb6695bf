//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.parley/config.json`) and environment.
//! Loaded once at startup and shared read-only afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Reply engine behavior (keywords, prefixes, echo modes).
    #[serde(default)]
    pub engine: EngineConfig,

    /// Remote completion provider.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Gateway server settings (health probe, webhooks).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (e.g. Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// Keywords and reply modes consumed by the reply engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Command that resets the conversation instead of calling the provider. Matched case-insensitively.
    #[serde(default = "default_reset_keyword")]
    pub reset_keyword: String,

    /// Keyword that must follow `@<bot name>` in group messages.
    #[serde(default)]
    pub group_command_keyword: String,

    /// Prefix required in direct messages. Empty means every direct message is a command.
    #[serde(default)]
    pub private_command_prefix: String,

    /// In groups, reply with the question, a separator, then the answer.
    #[serde(default = "default_true")]
    pub group_reply_echoes_question: bool,

    /// In direct chats, reply with the question, a separator, then the answer.
    #[serde(default)]
    pub private_reply_echoes_question: bool,

    /// What the user sees when the provider fails for a reason other than a timeout.
    #[serde(default)]
    pub failure_replies: FailureReplies,

    /// Whether replies within one conversation are serialized.
    #[serde(default)]
    pub reply_ordering: ReplyOrdering,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureReplies {
    /// Log the failure, send nothing.
    #[default]
    Silent,
    /// Send the question with an error line, like the timeout reply.
    Notify,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplyOrdering {
    /// Every command runs in its own task; replies may arrive out of order.
    #[default]
    Concurrent,
    /// One worker per conversation, commands handled in arrival order.
    PerConversation,
}

fn default_reset_keyword() -> String {
    "reset".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reset_keyword: default_reset_keyword(),
            group_command_keyword: String::new(),
            private_command_prefix: String::new(),
            group_reply_echoes_question: true,
            private_reply_echoes_question: false,
            failure_replies: FailureReplies::default(),
            reply_ordering: ReplyOrdering::default(),
        }
    }
}

/// Completion provider endpoint and request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Chat endpoint receiving the JSON POST. Overridden by PARLEY_PROVIDER_URL env.
    #[serde(default = "default_provider_url")]
    pub url: String,

    /// Persona prompt sent with every request.
    #[serde(default = "default_prompt")]
    pub prompt: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Deadline for the whole request including the response body (default 60).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_url() -> String {
    "https://chat.jinshuju.org/api/chat".to_string()
}

fn default_prompt() -> String {
    "You are a friendly, capable assistant. Answer briefly and clearly.".to_string()
}

fn default_model() -> String {
    "3.5".to_string()
}

fn default_temperature() -> f64 {
    0.5
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: default_provider_url(),
            prompt: default_prompt(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Per-channel config (e.g. Telegram bot token).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// When set, use webhook mode: Telegram POSTs updates to this URL. If unset, long-poll getUpdates is used.
    pub webhook_url: Option<String>,
    /// Optional secret for webhook verification (X-Telegram-Bot-Api-Secret-Token). Used only when webhook_url is set.
    pub webhook_secret: Option<String>,
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    non_empty_env("TELEGRAM_BOT_TOKEN").or_else(|| {
        config
            .channels
            .telegram
            .bot_token
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the provider URL: env PARLEY_PROVIDER_URL overrides config.
pub fn resolve_provider_url(config: &Config) -> String {
    non_empty_env("PARLEY_PROVIDER_URL").unwrap_or_else(|| config.provider.url.trim().to_string())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PARLEY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".parley").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or PARLEY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        parse_config_file(&path)?
    };
    Ok((config, path))
}

fn parse_config_file(path: &Path) -> Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing config from {}", path.display()))
}
