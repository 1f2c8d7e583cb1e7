//! End-to-end tests: drive the relay against in-process mock LINE and Gemini
//! servers so no credentials or network are needed. Each test starts its own
//! mock upstream and relay; server tasks are left running when the test ends.

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use lib::config::Config;
use lib::report;
use lib::server;
use serde_json::json;
use sha2::Sha256;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CHANNEL_SECRET: &str = "test-channel-secret";
const ACCESS_TOKEN: &str = "test-access-token";
const GENERATED_TEXT: &str = "富士山は日本一高い山です。標高は3776メートルです。";

/// What the mock upstream saw: Gemini prompts and LINE send bodies.
#[derive(Clone)]
struct MockState {
    gemini_prompts: Arc<Mutex<Vec<String>>>,
    replies: Arc<Mutex<Vec<serde_json::Value>>>,
    broadcasts: Arc<Mutex<Vec<serde_json::Value>>>,
    fail_generation: bool,
}

async fn mock_generate(
    State(s): State<MockState>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let prompt = body["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    s.gemini_prompts.lock().unwrap().push(prompt);
    if s.fail_generation {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "quota exceeded" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "candidates": [{ "content": { "parts": [{ "text": GENERATED_TEXT }] } }]
        })),
    )
}

async fn mock_reply(
    State(s): State<MockState>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    s.replies.lock().unwrap().push(body);
    Json(json!({}))
}

async fn mock_broadcast(
    State(s): State<MockState>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    s.broadcasts.lock().unwrap().push(body);
    Json(json!({}))
}

/// Start the mock LINE + Gemini upstream; returns its base URL and state.
async fn start_upstream(fail_generation: bool) -> (String, MockState) {
    let state = MockState {
        gemini_prompts: Arc::new(Mutex::new(Vec::new())),
        replies: Arc::new(Mutex::new(Vec::new())),
        broadcasts: Arc::new(Mutex::new(Vec::new())),
        fail_generation,
    };
    let app = Router::new()
        .route("/v1beta/models/:model", post(mock_generate))
        .route("/v2/bot/message/reply", post(mock_reply))
        .route("/v2/bot/message/broadcast", post(mock_broadcast))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}", addr), state)
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Start the relay pointed at the mock upstream; returns its base URL.
async fn start_relay(upstream_base: &str, broadcast_token: Option<&str>) -> String {
    let port = free_port();
    let mut config = Config::default();
    config.server.port = port;
    config.server.bind = "127.0.0.1".to_string();
    config.channels.line.channel_secret = Some(CHANNEL_SECRET.to_string());
    config.channels.line.channel_access_token = Some(ACCESS_TOKEN.to_string());
    config.channels.line.api_base = Some(upstream_base.to_string());
    config.generator.api_key = Some("test-gemini-key".to_string());
    config.generator.api_base = Some(upstream_base.to_string());
    config.broadcast.token = broadcast_token.map(|t| t.to_string());

    tokio::spawn(async move {
        let _ = server::run_server(config).await;
    });

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(format!("{}/", base)).send().await {
            if resp.status().is_success() {
                return base;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("relay did not become healthy within 5s");
}

fn sign(body: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(CHANNEL_SECRET.as_bytes()).expect("hmac key");
    mac.update(body.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

const FUJI_BODY: &str =
    r#"{"events":[{"type":"message","message":{"type":"text","text":"富士山"},"replyToken":"abc"}]}"#;

#[tokio::test]
async fn webhook_relays_generated_report() {
    let (upstream_base, upstream) = start_upstream(false).await;
    let relay_base = start_relay(&upstream_base, None).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/webhook", relay_base))
        .header("x-line-signature", sign(FUJI_BODY))
        .header("content-type", "application/json")
        .body(FUJI_BODY)
        .send()
        .await
        .expect("post webhook");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.expect("body"), "OK");

    let prompts = upstream.gemini_prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("富士山"));
    assert!(prompts[0].contains("概要"));
    assert!(prompts[0].contains("関連するキーワード"));

    let replies = upstream.replies.lock().unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["replyToken"].as_str(), Some("abc"));
    assert_eq!(
        replies[0]["messages"][0]["text"].as_str(),
        Some(GENERATED_TEXT)
    );
    assert!(upstream.broadcasts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn webhook_rejects_bad_signature_with_no_outbound_calls() {
    let (upstream_base, upstream) = start_upstream(false).await;
    let relay_base = start_relay(&upstream_base, None).await;

    let client = reqwest::Client::new();
    let url = format!("{}/api/webhook", relay_base);

    let resp = client
        .post(&url)
        .header("x-line-signature", "not-a-signature")
        .header("content-type", "application/json")
        .body(FUJI_BODY)
        .send()
        .await
        .expect("post webhook");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .post(&url)
        .header("content-type", "application/json")
        .body(FUJI_BODY)
        .send()
        .await
        .expect("post webhook without signature");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(upstream.gemini_prompts.lock().unwrap().is_empty());
    assert!(upstream.replies.lock().unwrap().is_empty());
}

#[tokio::test]
async fn webhook_rejects_signed_but_malformed_payload_with_no_outbound_calls() {
    let (upstream_base, upstream) = start_upstream(false).await;
    let relay_base = start_relay(&upstream_base, None).await;

    // Correctly signed, but not a webhook payload: signature proves origin,
    // yet there is nothing to relay.
    let body = "this is not json";
    let resp = reqwest::Client::new()
        .post(format!("{}/api/webhook", relay_base))
        .header("x-line-signature", sign(body))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("post webhook");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await.expect("body"), "malformed payload");

    assert!(upstream.gemini_prompts.lock().unwrap().is_empty());
    assert!(upstream.replies.lock().unwrap().is_empty());
}

#[tokio::test]
async fn generation_failure_still_replies_with_error_fallback() {
    let (upstream_base, upstream) = start_upstream(true).await;
    let relay_base = start_relay(&upstream_base, None).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/webhook", relay_base))
        .header("x-line-signature", sign(FUJI_BODY))
        .header("content-type", "application/json")
        .body(FUJI_BODY)
        .send()
        .await
        .expect("post webhook");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.expect("body"), "OK");

    let replies = upstream.replies.lock().unwrap();
    assert_eq!(replies.len(), 1, "delivery must still be attempted once");
    let text = replies[0]["messages"][0]["text"].as_str().expect("text");
    assert!(
        text.starts_with(report::REPORT_ERROR_PREFIX),
        "fallback reply must start with the error prefix, got: {}",
        text
    );
}

#[tokio::test]
async fn broadcast_requires_token_and_sends_greeting_prefixed_trivia() {
    let (upstream_base, upstream) = start_upstream(false).await;
    let relay_base = start_relay(&upstream_base, Some("sched-token")).await;

    let client = reqwest::Client::new();
    let url = format!("{}/broadcast", relay_base);

    let resp = client.post(&url).send().await.expect("post broadcast");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(upstream.broadcasts.lock().unwrap().is_empty());

    let resp = client
        .post(&url)
        .header("x-broadcast-token", "sched-token")
        .send()
        .await
        .expect("post broadcast with token");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.expect("body"), "broadcast sent");

    let today = chrono::Local::now().date_naive();
    let prompts = upstream.gemini_prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(&report::format_japanese_date(today)));

    let broadcasts = upstream.broadcasts.lock().unwrap();
    assert_eq!(broadcasts.len(), 1);
    let text = broadcasts[0]["messages"][0]["text"].as_str().expect("text");
    assert!(text.starts_with(report::DEFAULT_BROADCAST_GREETING));
    assert!(text.ends_with(GENERATED_TEXT));
}
