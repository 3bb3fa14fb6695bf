//! Integration test: Telegram webhook updates reach the engine queue as events.

use chrono::Utc;
use lib::channels::{BotIdentity, TelegramChannel};
use lib::config::Config;
use lib::engine::{ConversationKind, InboundEvent};
use lib::gateway::{router, GatewayState};
use std::sync::Arc;
use tokio::sync::mpsc;

async fn start(secret: Option<&str>) -> (String, mpsc::Receiver<InboundEvent>) {
    let mut config = Config::default();
    config.channels.telegram.webhook_secret = secret.map(str::to_string);
    let telegram = Arc::new(TelegramChannel::new(Some("test-token".to_string())));
    telegram.set_identity(BotIdentity {
        id: 42,
        username: "parley_bot".to_string(),
    });
    let (events_tx, events_rx) = mpsc::channel(8);
    let state = GatewayState {
        config: Arc::new(config),
        started_at: Utc::now(),
        events_tx,
        telegram: Some(telegram),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind gateway");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router(state)).await;
    });
    (format!("http://{}/telegram/webhook", addr), events_rx)
}

fn group_update() -> serde_json::Value {
    serde_json::json!({
        "update_id": 10,
        "message": {
            "from": { "id": 7, "first_name": "Alice", "username": "alice" },
            "chat": { "id": -1001, "type": "group", "title": "friends" },
            "date": Utc::now().timestamp(),
            "text": "@parley_bot ask hello",
            "entities": [{ "type": "mention", "offset": 0, "length": 11 }]
        }
    })
}

#[tokio::test]
async fn webhook_update_is_forwarded_as_event() {
    let (url, mut events) = start(None).await;
    let resp = reqwest::Client::new()
        .post(&url)
        .json(&group_update())
        .send()
        .await
        .expect("post update");
    assert!(resp.status().is_success());

    let event = events.recv().await.expect("event forwarded");
    assert_eq!(event.text, "@parley_bot ask hello");
    assert!(event.mentions_bot);
    assert_eq!(
        event.kind,
        ConversationKind::Group {
            topic: "friends".to_string()
        }
    );
    assert_eq!(event.conversation.id(), "-1001");
}

#[tokio::test]
async fn webhook_rejects_wrong_secret() {
    let (url, mut events) = start(Some("s3cret")).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(&url)
        .header("X-Telegram-Bot-Api-Secret-Token", "wrong")
        .json(&group_update())
        .send()
        .await
        .expect("post update");
    assert_eq!(resp.status().as_u16(), 403);

    let resp = client
        .post(&url)
        .header("X-Telegram-Bot-Api-Secret-Token", "s3cret")
        .json(&group_update())
        .send()
        .await
        .expect("post update");
    assert!(resp.status().is_success());
    assert!(events.recv().await.is_some());
}

#[tokio::test]
async fn webhook_rejects_malformed_json() {
    let (url, _events) = start(None).await;
    let resp = reqwest::Client::new()
        .post(&url)
        .body("not json")
        .send()
        .await
        .expect("post body");
    assert_eq!(resp.status().as_u16(), 400);
}
