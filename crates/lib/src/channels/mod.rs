//! Communication channels (LINE).
//!
//! The channel verifies webhook signatures, parses event payloads, and sends
//! replies and broadcasts. Inbound messages are handed to the relay for
//! generation and delivery.

mod inbound;
mod line;

pub use inbound::InboundMessage;
pub use line::{LineChannel, WebhookEvent, WebhookPayload};
