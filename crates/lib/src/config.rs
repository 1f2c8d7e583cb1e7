//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.shirabe/config.json`) and
//! environment. Secrets (LINE channel credentials, Gemini API key, broadcast
//! token) can be set in the file or overridden from the process environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Channel settings (LINE).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Text-generation settings (Gemini).
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Scheduled broadcast settings.
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

/// Server bind and port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for the webhook HTTP server (default 3000).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

fn default_server_port() -> u16 {
    3000
}

fn default_server_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub line: LineChannelConfig,
}

/// LINE Messaging API channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineChannelConfig {
    /// Channel secret used to verify webhook signatures. Overridden by
    /// LINE_CHANNEL_SECRET env when set.
    pub channel_secret: Option<String>,
    /// Channel access token for the reply/broadcast endpoints. Overridden by
    /// LINE_CHANNEL_ACCESS_TOKEN env when set.
    pub channel_access_token: Option<String>,
    /// Override the Messaging API base URL (default https://api.line.me).
    /// Mainly for pointing tests at a local mock.
    pub api_base: Option<String>,
}

/// Gemini text-generation config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfig {
    /// API key for the generative-language API. Overridden by GEMINI_API_KEY env when set.
    pub api_key: Option<String>,
    /// Model name (default "gemini-2.0-flash-exp").
    pub model: Option<String>,
    /// Override the API base URL (default https://generativelanguage.googleapis.com).
    pub api_base: Option<String>,
}

/// Broadcast endpoint config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastConfig {
    /// Shared token the scheduler must send in x-broadcast-token. When unset,
    /// /broadcast is open (only safe when bind is loopback). Overridden by
    /// SHIRABE_BROADCAST_TOKEN env when set.
    pub token: Option<String>,
    /// Override the greeting prepended to the daily trivia broadcast.
    pub greeting: Option<String>,
}

/// Env var value when set and non-empty, else the config value (trimmed, non-empty).
fn env_or_config(var: &str, config_value: Option<&String>) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            config_value
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the LINE channel secret: env LINE_CHANNEL_SECRET overrides config.
pub fn resolve_channel_secret(config: &Config) -> Option<String> {
    env_or_config(
        "LINE_CHANNEL_SECRET",
        config.channels.line.channel_secret.as_ref(),
    )
}

/// Resolve the LINE channel access token: env LINE_CHANNEL_ACCESS_TOKEN overrides config.
pub fn resolve_channel_access_token(config: &Config) -> Option<String> {
    env_or_config(
        "LINE_CHANNEL_ACCESS_TOKEN",
        config.channels.line.channel_access_token.as_ref(),
    )
}

/// Resolve the Gemini API key: env GEMINI_API_KEY overrides config.
pub fn resolve_gemini_api_key(config: &Config) -> Option<String> {
    env_or_config("GEMINI_API_KEY", config.generator.api_key.as_ref())
}

/// Resolve the broadcast token: env SHIRABE_BROADCAST_TOKEN overrides config.
pub fn resolve_broadcast_token(config: &Config) -> Option<String> {
    env_or_config("SHIRABE_BROADCAST_TOKEN", config.broadcast.token.as_ref())
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("SHIRABE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".shirabe").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or SHIRABE_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Create the config directory and write a default `config.json` if missing.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let default_config = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}
