//! Gateway HTTP server (single port).

use crate::channels::{TelegramChannel, TelegramUpdate};
use crate::config::{self, Config};
use crate::engine::{InboundEvent, ReplyEngine, SessionBoundary};
use crate::llm::CompletionClient;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the queue between transports and the engine loop.
const EVENT_QUEUE: usize = 64;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Engine startup cutoff, reported by the health probe.
    pub started_at: DateTime<Utc>,
    /// Sender into the engine event loop (webhook updates are pushed here).
    pub events_tx: mpsc::Sender<InboundEvent>,
    /// Present when a Telegram bot token is configured.
    pub telegram: Option<Arc<TelegramChannel>>,
}

/// Routes: `GET /` health, `POST /telegram/webhook` updates.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state)
}

/// Run the gateway; binds to config.gateway.bind:config.gateway.port.
/// Starts the reply engine and the Telegram channel (long-poll or webhook mode) when a bot token is set.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let provider = Arc::new(CompletionClient::from_config(&config));
    log::info!(
        "completion provider: {} (timeout {}s)",
        provider.url(),
        provider.timeout().as_secs()
    );
    // Telegram dates are whole seconds.
    let boundary = SessionBoundary::new().to_whole_seconds();
    let engine = ReplyEngine::with_boundary(config.engine.clone(), provider, boundary);
    let started_at = engine.boundary().startup();
    let (events_tx, events_rx) = mpsc::channel::<InboundEvent>(EVENT_QUEUE);
    tokio::spawn(engine.run(events_rx));

    let mut channel_tasks: Vec<JoinHandle<()>> = Vec::new();
    let mut webhook_mode = false;
    let telegram = match config::resolve_telegram_token(&config) {
        Some(token) => {
            let telegram = Arc::new(TelegramChannel::new(Some(token)));
            telegram
                .identify()
                .await
                .map_err(|e| anyhow::anyhow!(e))
                .context("identifying telegram bot")?;
            if let Some(ref url) = config.channels.telegram.webhook_url {
                let secret = config.channels.telegram.webhook_secret.as_deref();
                if let Err(e) = telegram.set_webhook(url, secret).await {
                    log::warn!("telegram set_webhook failed: {}", e);
                } else {
                    log::info!("telegram channel registered (webhook mode): {}", url);
                }
                webhook_mode = true;
            } else {
                // A leftover webhook makes getUpdates fail.
                if let Err(e) = telegram.delete_webhook().await {
                    log::debug!("telegram delete_webhook before polling: {}", e);
                }
                channel_tasks.push(telegram.clone().start_inbound(events_tx.clone()));
                log::info!("telegram channel registered and getUpdates loop started");
            }
            Some(telegram)
        }
        None => {
            log::warn!("no telegram bot token configured; only the health endpoint is served");
            None
        }
    };

    let state = GatewayState {
        config: Arc::new(config.clone()),
        started_at,
        events_tx,
        telegram: telegram.clone(),
    };
    let app = router(state);

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(telegram, webhook_mode, channel_tasks))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops the Telegram channel, removes its webhook if used, then awaits channel tasks.
async fn shutdown_signal(
    telegram: Option<Arc<TelegramChannel>>,
    webhook_mode: bool,
    channel_tasks: Vec<JoinHandle<()>>,
) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping channels");

    if let Some(t) = telegram {
        t.stop();
        if webhook_mode {
            if let Err(e) = t.delete_webhook().await {
                log::debug!("telegram delete_webhook on shutdown: {}", e);
            }
        }
    }

    for h in channel_tasks {
        // The long poll can take up to its timeout to notice the stop flag.
        h.abort();
        let _ = h.await;
    }
    log::info!("channel tasks finished");
}

/// POST /telegram/webhook — receives Telegram update JSON; verifies optional secret, pushes the event to the engine.
async fn telegram_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(ref telegram) = state.telegram else {
        return StatusCode::NOT_FOUND;
    };
    if let Some(ref expected) = state.config.channels.telegram.webhook_secret {
        let provided = headers
            .get("X-Telegram-Bot-Api-Secret-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    let Some(event) = telegram.inbound_event(&update) else {
        return StatusCode::OK;
    };
    if state.events_tx.send(event).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "startedAt": state.started_at.to_rfc3339(),
    }))
}
