//! Text-generation oracle client.
//!
//! The pipeline talks to the oracle through the [`TextOracle`] trait so the
//! provider is injected, not hard-coded. [`LlmClient`] implements it against
//! an OpenAI-compatible chat-completions endpoint. Retry and timeout policy
//! beyond the single request timeout belongs to the provider side, not here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::error::OracleError;

/// One role-tagged message in an oracle conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant", content: content.into() }
    }
}

/// External text-generation oracle.
#[async_trait]
pub trait TextOracle: Send + Sync {
    /// Single-turn completion constrained to a JSON object response.
    ///
    /// An empty reply surfaces as an empty string, not an error; callers decide
    /// whether that is usable.
    async fn complete_json(
        &self,
        system_prompt: &str,
        user_text: &str,
        max_tokens: u32,
    ) -> Result<String, OracleError>;

    /// Multi-turn completion over role-tagged messages.
    async fn complete_chat(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, OracleError>;
}

/// Client for an OpenAI-compatible chat-completions API.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

// Low temperatures: classification must be reproducible, answers should stay
// close to the payload.
const JSON_TEMPERATURE: f64 = 0.1;
const CHAT_TEMPERATURE: f64 = 0.2;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Error body from an OpenAI-compatible API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl LlmClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        tracing::info!(base_url = base_url, model = model, "LLM oracle client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f64,
        json_mode: bool,
    ) -> Result<String, OracleError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let request = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens,
            temperature,
            response_format: json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        debug!(url = %url, model = %self.model, json_mode, "oracle request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "oracle request failed");
                OracleError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorResponse>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_else(|_| format!("oracle error: {status}"));
            error!(status = %status, message = %message, "oracle returned error status");
            return Err(OracleError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: CompletionResponse = response.json().await.map_err(OracleError::Transport)?;

        // A success response with no content is "unusable", not an error;
        // callers apply their own fallback policy.
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl TextOracle for LlmClient {
    async fn complete_json(
        &self,
        system_prompt: &str,
        user_text: &str,
        max_tokens: u32,
    ) -> Result<String, OracleError> {
        let messages = [
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_text),
        ];
        self.complete(&messages, max_tokens, JSON_TEMPERATURE, true)
            .await
    }

    async fn complete_chat(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, OracleError> {
        let mut all = Vec::with_capacity(messages.len() + 1);
        all.push(ChatMessage::system(system_prompt));
        all.extend(messages.iter().cloned());
        self.complete(&all, max_tokens, CHAT_TEMPERATURE, false)
            .await
    }
}
