//! Completion provider client: one JSON POST per command, response body returned as plain text.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use std::time::Duration;

use crate::config::{self, Config};

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// Connection failure or non-success status.
    #[error("completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("ChatGPT timed out for waiting response")]
    Timeout,
    /// Body ended with zero bytes or could not be read.
    #[error("completion provider returned an empty or unreadable body")]
    EmptyBody,
}

/// Turns a command into an answer.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, text: &str) -> Result<String, CompletionError>;
}

/// HTTP client for the remote chat endpoint.
#[derive(Clone)]
pub struct CompletionClient {
    url: String,
    prompt: String,
    model: String,
    temperature: f64,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// The endpoint takes a single message object, not a list.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: ChatMessage<'a>,
    prompt: &'a str,
    temperature: f64,
    model: &'a str,
}

impl CompletionClient {
    pub fn new(
        url: impl Into<String>,
        prompt: impl Into<String>,
        model: impl Into<String>,
        temperature: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            prompt: prompt.into(),
            model: model.into(),
            temperature,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config::resolve_provider_url(config),
            config.provider.prompt.clone(),
            config.provider.model.clone(),
            config.provider.temperature,
            config.provider.timeout(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn request(&self, text: &str) -> Result<String, CompletionError> {
        let body = ChatRequest {
            messages: ChatMessage {
                role: "user",
                content: text,
            },
            prompt: &self.prompt,
            temperature: self.temperature,
            model: &self.model,
        };
        let res = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(CompletionError::ProviderUnavailable(format!("{} {}", status, body)));
        }
        let mut stream = res.bytes_stream();
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout
                } else {
                    log::debug!("completion: reading body failed: {}", e);
                    CompletionError::EmptyBody
                }
            })?;
            buffer.extend_from_slice(&chunk);
        }
        if buffer.is_empty() {
            return Err(CompletionError::EmptyBody);
        }
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn request_error(e: reqwest::Error) -> CompletionError {
    if e.is_timeout() {
        CompletionError::Timeout
    } else {
        CompletionError::ProviderUnavailable(e.to_string())
    }
}

#[async_trait]
impl CompletionProvider for CompletionClient {
    /// Single attempt. The request is dropped when the deadline passes.
    async fn complete(&self, text: &str) -> Result<String, CompletionError> {
        match tokio::time::timeout(self.timeout, self.request(text)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_single_message_object() {
        let body = ChatRequest {
            messages: ChatMessage {
                role: "user",
                content: "hello",
            },
            prompt: "be nice",
            temperature: 0.5,
            model: "3.5",
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "messages": { "role": "user", "content": "hello" },
                "prompt": "be nice",
                "temperature": 0.5,
                "model": "3.5"
            })
        );
    }

    #[test]
    fn from_config_uses_provider_settings() {
        let mut config = Config::default();
        config.provider.model = "gpt-x".to_string();
        config.provider.timeout_secs = 7;
        let client = CompletionClient::from_config(&config);
        assert_eq!(client.timeout(), Duration::from_secs(7));
        assert_eq!(client.model, "gpt-x");
    }

    #[tokio::test]
    async fn unreachable_provider_is_unavailable() {
        let client = CompletionClient::new(
            "http://127.0.0.1:1/api/chat",
            "p",
            "m",
            0.5,
            Duration::from_secs(5),
        );
        let err = client.complete("hello").await.unwrap_err();
        assert!(matches!(err, CompletionError::ProviderUnavailable(_)), "{:?}", err);
    }
}
