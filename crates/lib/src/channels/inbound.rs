//! Inbound message from a channel: delivered to the relay for generation and reply.

/// A text message from a channel to be answered through the reply sink.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Single-use handle identifying the conversation to reply to.
    pub reply_token: String,
    pub text: String,
}
