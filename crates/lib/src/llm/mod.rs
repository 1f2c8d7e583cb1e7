//! Text-generation abstraction and Gemini client.
//!
//! One prompt in, one completion out. No streaming, no retries.

mod gemini;

pub use gemini::{GeminiClient, GeminiError};

use async_trait::async_trait;

/// A text-generation backend. The relay is written against this seam so
/// tests can substitute a fake generator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GeminiError>;
}
