//! Completion provider used by the assistant.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::transcript::Turn;
use crate::config::AssistantConfig;
use crate::error::{ChatError, Result};

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// User agent string for completion requests.
const USER_AGENT: &str = concat!("groupchat/", env!("CARGO_PKG_VERSION"));

/// Source of assistant replies.
///
/// Given the whole conversation, return one reply or an error. Callers do
/// not retry.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, turns: &[Turn]) -> Result<String>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    seed: i64,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Provider speaking the OpenAI chat completions API.
pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    seed: i64,
}

impl OpenAiProvider {
    /// Create a provider from the assistant configuration.
    pub fn new(config: &AssistantConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ChatError::Provider(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: completions_url(&config.base_url),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            seed: config.seed,
        })
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, turns: &[Turn]) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages: turns,
            seed: self.seed,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::Provider(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChatError::Provider(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(ChatError::Provider(format!("HTTP {status}: {body}")));
        }

        parse_reply(&body)
    }
}

/// Join the base URL and the completions path without doubling slashes.
fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Extract the first choice's content from a completions response body.
fn parse_reply(body: &str) -> Result<String> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| ChatError::Provider(format!("malformed response: {e}")))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ChatError::Provider("response contained no choices".to_string()))
}
