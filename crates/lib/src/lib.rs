//! Shirabe core library — config, LINE channel, Gemini client, report
//! prompts, and the webhook relay server used by the CLI binary.

pub mod channels;
pub mod config;
pub mod llm;
pub mod relay;
pub mod report;
pub mod server;
