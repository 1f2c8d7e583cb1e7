//! The relay: one inbound message in, one reply out.
//!
//! A single parameterized path replaces the per-variant handler copies:
//! the relay only needs something that generates text from a prompt and
//! something that can deliver a reply for a reply token.

use crate::channels::InboundMessage;
use crate::llm::TextGenerator;
use crate::report;
use async_trait::async_trait;

/// Delivery side of the relay: send one reply for a single-use reply token.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send_reply(&self, reply_token: &str, text: &str) -> Result<(), String>;
}

/// Relay one inbound message: build the report prompt from the message text,
/// call the generator once, and attempt delivery exactly once. Generation
/// failure becomes the error-fallback reply; delivery failure is logged, not
/// retried (the reply token is single-use anyway).
pub async fn relay_message(
    generator: &dyn TextGenerator,
    sink: &dyn ReplySink,
    event: &InboundMessage,
) {
    let prompt = report::report_prompt(&event.text);
    let reply = match generator.generate(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            log::warn!("relay: generation failed: {}", e);
            format!("{}{}", report::REPORT_ERROR_PREFIX, e)
        }
    };
    if let Err(e) = sink.send_reply(&event.reply_token, &reply).await {
        log::warn!("relay: reply delivery failed: {}", e);
    }
}
