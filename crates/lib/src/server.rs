//! Webhook relay HTTP server.
//!
//! Routes: `GET /` health probe, `POST /api/webhook` for LINE events,
//! `POST /broadcast` for the scheduler-triggered daily trivia.

use crate::channels::{LineChannel, WebhookPayload};
use crate::config::{self, Config};
use crate::llm::GeminiClient;
use crate::relay;
use crate::report;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Shared state for the relay server: config plus the injected clients.
/// Clients are constructed once at startup and live for the process.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub line: Arc<LineChannel>,
    pub gemini: GeminiClient,
    /// When Some, /broadcast must provide this value in x-broadcast-token.
    pub broadcast_token: Option<String>,
}

/// Build the server state from config: resolve secrets (env over file) and
/// construct the LINE and Gemini clients.
pub fn build_state(config: Config) -> ServerState {
    let channel_secret = config::resolve_channel_secret(&config);
    let access_token = config::resolve_channel_access_token(&config);
    if channel_secret.is_none() {
        log::warn!("line channel secret not configured; all webhook requests will be rejected");
    }
    if access_token.is_none() {
        log::warn!("line channel access token not configured; sends will fail");
    }
    let line = Arc::new(LineChannel::new(
        channel_secret,
        access_token,
        config.channels.line.api_base.clone(),
    ));
    let gemini = GeminiClient::new(
        config::resolve_gemini_api_key(&config),
        config.generator.model.clone(),
        config.generator.api_base.clone(),
    );
    let broadcast_token = config::resolve_broadcast_token(&config);
    ServerState {
        config: Arc::new(config),
        line,
        gemini,
        broadcast_token,
    }
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/api/webhook", post(line_webhook))
        .route("/broadcast", post(broadcast))
        .with_state(state)
}

/// Run the relay server; binds to config.server.bind:config.server.port.
/// When bind is not loopback, a broadcast token must be configured or startup
/// fails — the webhook endpoint is protected by its signature either way, but
/// /broadcast would otherwise be open to anyone who can reach the port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_server(config: Config) -> Result<()> {
    let bind = config.server.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) && config::resolve_broadcast_token(&config).is_none() {
        anyhow::bail!(
            "refusing to bind to {} with an open /broadcast endpoint (set broadcast.token or SHIRABE_BROADCAST_TOKEN)",
            bind
        );
    }
    let port = config.server.port;
    let state = build_state(config);
    let app = router(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("relay listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server exited")?;
    log::info!("relay stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
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
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<ServerState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.server.port,
    }))
}

/// POST /api/webhook — receives LINE event JSON; verifies the signature over
/// the raw body, then relays each text message inline. Bad signatures are
/// rejected before anything else happens.
async fn line_webhook(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let signature = headers
        .get("x-line-signature")
        .and_then(|v| v.to_str().ok());
    if let Err(e) = state.line.verify_signature(signature, &body) {
        log::warn!("webhook: signature verification failed: {}", e);
        return (StatusCode::BAD_REQUEST, "invalid signature");
    }
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("webhook: malformed payload: {}", e);
            return (StatusCode::BAD_REQUEST, "malformed payload");
        }
    };
    for event in payload.text_messages() {
        relay::relay_message(&state.gemini, state.line.as_ref(), &event).await;
    }
    (StatusCode::OK, "OK")
}

/// POST /broadcast — generates the daily trivia for today's date, prepends
/// the greeting, and broadcasts it to all subscribers. Intended for an
/// external scheduler; not idempotent, re-invoking re-sends.
async fn broadcast(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    if let Some(ref required) = state.broadcast_token {
        let provided = headers
            .get("x-broadcast-token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .trim();
        if provided != required {
            log::warn!("broadcast: token mismatch, rejecting");
            return (StatusCode::FORBIDDEN, "broadcast token mismatch".to_string());
        }
    }
    let today = chrono::Local::now().date_naive();
    let prompt = report::trivia_prompt(today);
    let generated = match state.gemini.generate_content(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            log::warn!("broadcast: generation failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };
    let text = report::broadcast_text(state.config.broadcast.greeting.as_deref(), &generated);
    if let Err(e) = state.line.broadcast(&text).await {
        log::warn!("broadcast: delivery failed: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, e);
    }
    log::info!("broadcast sent for {}", report::format_japanese_date(today));
    (StatusCode::OK, "broadcast sent".to_string())
}
