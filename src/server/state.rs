//! Shared server state handed to every session.

use std::sync::Arc;

use tracing::{info, warn};

use super::broadcast::Broadcaster;
use super::registry::ConnectionRegistry;
use crate::assistant::{AssistantBridge, CompletionProvider, OpenAiProvider};
use crate::config::{Config, ServerConfig};
use crate::Result;

/// Everything a session handler needs, constructed once at startup.
pub struct ChatState {
    pub config: ServerConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Broadcaster,
    /// `None` when no API key is configured; `#chat` is then ignored.
    pub assistant: Option<Arc<AssistantBridge>>,
}

impl ChatState {
    /// Create state with an empty registry and no assistant.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        Self {
            config,
            registry,
            broadcaster,
            assistant: None,
        }
    }

    /// Attach an assistant backed by `provider`.
    ///
    /// Starts the assistant's worker task, so this needs a tokio runtime.
    pub fn with_assistant(
        mut self,
        provider: Arc<dyn CompletionProvider>,
        system_prompt: impl Into<String>,
    ) -> Self {
        self.assistant = Some(Arc::new(AssistantBridge::new(
            provider,
            system_prompt,
            self.broadcaster.clone(),
        )));
        self
    }

    /// Build state from the full configuration.
    ///
    /// The assistant is wired to the OpenAI-compatible provider when it is
    /// enabled and an API key is present.
    pub fn from_config(config: &Config) -> Result<Self> {
        let state = Self::new(config.server.clone());

        if config.assistant.is_active() {
            let provider = OpenAiProvider::new(&config.assistant)?;
            info!(
                "Assistant enabled (model {} via {})",
                config.assistant.model,
                provider.endpoint()
            );
            Ok(state.with_assistant(Arc::new(provider), config.assistant.system_prompt.clone()))
        } else {
            if config.assistant.enabled {
                warn!("No API key found; #chat commands will be ignored");
            }
            Ok(state)
        }
    }
}
