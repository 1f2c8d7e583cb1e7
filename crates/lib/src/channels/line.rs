//! LINE channel: webhook signature verification, event parsing, and
//! reply/broadcast sends via the Messaging API.

use crate::channels::inbound::InboundMessage;
use crate::relay::ReplySink;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

const LINE_API_BASE: &str = "https://api.line.me";

/// Maximum length of a LINE text message; longer sends are rejected by the API.
const MAX_TEXT_CHARS: usize = 5000;

type HmacSha256 = Hmac<Sha256>;

/// Webhook request body from the LINE platform.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

/// One webhook event. Only `message` events with a text message carry a
/// message body we relay; follow/unfollow/postback and other types are skipped.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl WebhookPayload {
    /// Extract the relayable text messages: `message` events of type `text`
    /// that carry a reply token. Everything else is skipped, not an error.
    pub fn text_messages(&self) -> Vec<InboundMessage> {
        self.events
            .iter()
            .filter(|e| e.typ == "message")
            .filter_map(|e| {
                let token = e.reply_token.as_ref()?;
                let msg = e.message.as_ref()?;
                if msg.typ != "text" {
                    log::debug!("line: skipping non-text message of type {}", msg.typ);
                    return None;
                }
                let text = msg.text.as_ref()?;
                Some(InboundMessage {
                    reply_token: token.clone(),
                    text: text.clone(),
                })
            })
            .collect()
    }
}

/// LINE channel connector: verifies webhook signatures and sends replies and
/// broadcasts via the Messaging API.
pub struct LineChannel {
    channel_secret: Option<String>,
    access_token: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

impl LineChannel {
    pub fn new(
        channel_secret: Option<String>,
        access_token: Option<String>,
        api_base: Option<String>,
    ) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| LINE_API_BASE.to_string());
        Self {
            channel_secret,
            access_token,
            api_base,
            client: reqwest::Client::new(),
        }
    }

    /// Verify the x-line-signature header: base64(HMAC-SHA256(channel secret, body)).
    /// Missing header, missing secret, or mismatch all reject.
    pub fn verify_signature(&self, signature: Option<&str>, body: &[u8]) -> Result<(), String> {
        let secret = self
            .channel_secret
            .as_ref()
            .ok_or("line channel secret not configured")?;
        let signature = signature.ok_or("missing x-line-signature header")?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| "line channel secret unusable as hmac key".to_string())?;
        mac.update(body);
        let expected = BASE64.encode(mac.finalize().into_bytes());
        if signature != expected {
            return Err("signature mismatch".to_string());
        }
        Ok(())
    }

    /// Send a reply to a conversation via POST /v2/bot/message/reply.
    /// The reply token is single-use; one attempt, no retries.
    pub async fn reply(&self, reply_token: &str, text: &str) -> Result<(), String> {
        let body = json!({
            "replyToken": reply_token,
            "messages": [{ "type": "text", "text": truncate_text(text) }],
        });
        self.post_message("/v2/bot/message/reply", body).await
    }

    /// Send a text message to all subscribers via POST /v2/bot/message/broadcast.
    pub async fn broadcast(&self, text: &str) -> Result<(), String> {
        let body = json!({
            "messages": [{ "type": "text", "text": truncate_text(text) }],
        });
        self.post_message("/v2/bot/message/broadcast", body).await
    }

    async fn post_message(&self, path: &str, body: serde_json::Value) -> Result<(), String> {
        let token = self
            .access_token
            .as_ref()
            .ok_or("line channel access token not configured")?;
        let url = format!("{}{}", self.api_base, path);
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("{} failed: {} {}", path, status, body));
        }
        Ok(())
    }
}

#[async_trait]
impl ReplySink for LineChannel {
    async fn send_reply(&self, reply_token: &str, text: &str) -> Result<(), String> {
        LineChannel::reply(self, reply_token, text).await
    }
}

/// Clamp text to the LINE message limit on a character boundary.
fn truncate_text(text: &str) -> &str {
    match text.char_indices().nth(MAX_TEXT_CHARS) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}
