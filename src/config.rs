//! Configuration module for groupchat.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{ChatError, Result};

/// Default persona for the assistant.
///
/// Replies travel as a single protocol line, so the prompt forbids newlines.
pub const DEFAULT_SYSTEM_PROMPT: &str = "you are a gen z kid in a groupchat. \
use gen z slang and typeface. DO NOT USE NEWLINES IN YOUR RESPONSE.";

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Seconds a new connection has to send its display name.
    #[serde(default = "default_name_timeout")]
    pub name_timeout_secs: u64,
    /// Idle timeout in seconds for active sessions (0 = never).
    #[serde(default)]
    pub idle_timeout_secs: u64,
    /// Upper bound in seconds for a single socket write.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    /// Number of outbound lines queued per session before drops.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    /// Longest accepted inbound line in bytes, terminator excluded.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_connections() -> usize {
    64
}

fn default_name_timeout() -> u64 {
    30
}

fn default_write_timeout() -> u64 {
    5
}

fn default_outbox_capacity() -> usize {
    64
}

fn default_max_line_length() -> usize {
    4096
}

impl ServerConfig {
    /// Address string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Time a new connection has to send its display name.
    pub fn name_timeout(&self) -> Duration {
        Duration::from_secs(self.name_timeout_secs)
    }

    /// Idle timeout, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// Upper bound for one socket write to a peer.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            name_timeout_secs: default_name_timeout(),
            idle_timeout_secs: 0,
            write_timeout_secs: default_write_timeout(),
            outbox_capacity: default_outbox_capacity(),
            max_line_length: default_max_line_length(),
        }
    }
}

/// Assistant (completion provider) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    /// Whether the `#chat` command is served at all.
    #[serde(default = "default_assistant_enabled")]
    pub enabled: bool,
    /// API key for the completion provider.
    #[serde(default)]
    pub api_key: String,
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name sent with every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling seed.
    #[serde(default)]
    pub seed: i64,
    /// Total request timeout in seconds.
    #[serde(default = "default_assistant_timeout")]
    pub timeout_secs: u64,
    /// System instruction seeded once into the transcript.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_assistant_enabled() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_assistant_timeout() -> u64 {
    60
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl AssistantConfig {
    /// True when enabled and an API key is available.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.api_key.is_empty()
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            enabled: default_assistant_enabled(),
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            seed: 0,
            timeout_secs: default_assistant_timeout(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/groupchat.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Assistant configuration.
    #[serde(default)]
    pub assistant: AssistantConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ChatError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| ChatError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `OPENAI_API_KEY`: API key for the assistant
    /// - `GROUPCHAT_PORT`: listening port
    pub fn apply_env_overrides(&mut self) {
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            if !api_key.is_empty() {
                self.assistant.api_key = api_key;
            }
        }

        if let Ok(port) = std::env::var("GROUPCHAT_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid GROUPCHAT_PORT value {:?}", port),
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(ChatError::Validation(
                "server.port must be greater than 0".to_string(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(ChatError::Validation(
                "server.max_connections must be greater than 0".to_string(),
            ));
        }
        if self.server.outbox_capacity == 0 {
            return Err(ChatError::Validation(
                "server.outbox_capacity must be greater than 0".to_string(),
            ));
        }
        if self.server.max_line_length == 0 {
            return Err(ChatError::Validation(
                "server.max_line_length must be greater than 0".to_string(),
            ));
        }
        if self.server.name_timeout_secs == 0 {
            return Err(ChatError::Validation(
                "server.name_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.server.write_timeout_secs == 0 {
            return Err(ChatError::Validation(
                "server.write_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.assistant.enabled {
            url::Url::parse(&self.assistant.base_url).map_err(|e| {
                ChatError::Validation(format!(
                    "assistant.base_url {:?} is not a valid URL: {e}",
                    self.assistant.base_url
                ))
            })?;
        }
        Ok(())
    }
}

/// Load `KEY=value` pairs from a dotenv file into the process environment.
///
/// Variables that are already set win over the file. A missing file is not
/// an error; `Ok(false)` is returned instead.
pub fn load_env_file<P: AsRef<Path>>(path: P) -> Result<bool> {
    match dotenvy::from_path(path.as_ref()) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(ChatError::Config(format!(
            "env file {} error: {e}",
            path.as_ref().display()
        ))),
    }
}
