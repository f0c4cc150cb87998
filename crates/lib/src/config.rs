//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.kiwi/config.json`) and environment.
//! Every section has defaults, so an empty `{}` is a working config.

use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Bot identity and responder choice.
    #[serde(default)]
    pub bot: BotConfig,

    /// Conversation log location.
    #[serde(default)]
    pub log: LogConfig,

    /// Ollama endpoint and model.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Router tuning.
    #[serde(default)]
    pub router: RouterConfig,

    /// Scheduled messages registered at startup.
    #[serde(default)]
    pub timed_events: Vec<TimedEventConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// Display name the bot answers to in group mentions; also the sender id of its replies.
    #[serde(default = "default_bot_name")]
    pub name: String,

    #[serde(default)]
    pub responder: Responder,
}

/// Which response generator the router uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Responder {
    /// Answer with the LLM, using recent chat history.
    #[default]
    Llm,
    /// Answer "Received: <text>" without a model.
    Echo,
}

fn default_bot_name() -> String {
    "Kiwi".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            responder: Responder::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// Conversation log file. Overridden by KIWI_LOG_FILE env. Default ~/.kiwi/log.json.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// Ollama base URL (default http://127.0.0.1:11434).
    pub base_url: Option<String>,
    /// Model name as shown by `ollama list`. Overridden by KIWI_MODEL env.
    pub model: Option<String>,
    /// Per-request timeout in seconds (default 120).
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    /// Dispatch loop poll interval in milliseconds (default 1000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// A scheduled message: every `interval_secs`, `text` from `sender_id` enters chat `chat_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedEventConfig {
    pub interval_secs: u64,
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
}

impl TimedEventConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn kiwi_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".kiwi"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    env_override("KIWI_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| kiwi_home().join("config.json"))
}

/// Resolve the conversation log path: env KIWI_LOG_FILE overrides config.
pub fn resolve_log_file(config: &Config) -> PathBuf {
    env_override("KIWI_LOG_FILE")
        .map(PathBuf::from)
        .or_else(|| {
            config
                .log
                .file
                .clone()
                .filter(|p| !p.as_os_str().is_empty())
        })
        .unwrap_or_else(|| kiwi_home().join("log.json"))
}

/// Resolve the model name: env KIWI_MODEL overrides config; falls back to the default model.
pub fn resolve_model(config: &Config) -> String {
    env_override("KIWI_MODEL")
        .or_else(|| {
            config
                .llm
                .model
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

pub fn resolve_llm_base_url(config: &Config) -> String {
    config
        .llm
        .base_url
        .as_ref()
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// Load config from the given path, or the default path (or KIWI_CONFIG_PATH). Missing file => default config.
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
