//! AI provider trait and common types.
//!
//! Defines the interface the diagnoser talks to. Providers own their model
//! choice; callers only supply messages and generation options.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on a single generation call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variable overriding [`DEFAULT_TIMEOUT`], in seconds.
pub const ENV_AI_TIMEOUT: &str = "AI_TIMEOUT_SECS";

/// Errors from a text-generation provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider has no API key.
    #[error("{0} not set")]
    NotConfigured(&'static str),

    #[error("Unknown AI provider '{0}' (expected 'gemini' or 'openai')")]
    UnknownProvider(String),

    #[error("{provider} API request failed: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("Failed to parse {provider} response: {reason}")]
    Decode {
        provider: &'static str,
        reason: String,
    },

    #[error("{0} returned no text")]
    EmptyResponse(&'static str),
}

impl ProviderError {
    /// Wrap a transport error with the request URL stripped, since some
    /// providers carry credentials in the query string.
    pub(crate) fn request(provider: &'static str, source: reqwest::Error) -> Self {
        Self::Request {
            provider,
            source: source.without_url(),
        }
    }
}

/// Generation timeout from `AI_TIMEOUT_SECS`, falling back to the default.
pub(crate) fn timeout_from_env() -> Duration {
    std::env::var(ENV_AI_TIMEOUT)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map_or(DEFAULT_TIMEOUT, Duration::from_secs)
}

/// HTTP client shared by the providers, bounded by `timeout`.
pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build AI HTTP client, using defaults");
            Client::new()
        })
}

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AIRole {
    System,
    User,
    Assistant,
}

/// A message in a conversation with an AI model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIMessage {
    pub role: AIRole,
    pub content: String,
}

impl AIMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: AIRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: AIRole::User,
            content: content.into(),
        }
    }
}

/// Token usage information from an AI response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// Response from an AI model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
    pub provider: String,
}

/// Options for text generation.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Temperature for sampling (0.0 to 1.0)
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask the provider for a JSON-only response, where supported.
    pub json_mode: bool,
}

/// Trait for AI providers.
#[async_trait]
pub trait AIProvider: Send + Sync {
    /// Provider name (e.g. "gemini", "openai").
    fn name(&self) -> &'static str;

    /// Environment variable holding the API key.
    fn api_key_env_var(&self) -> &'static str;

    fn is_configured(&self) -> bool;

    /// Model used for every request.
    fn model(&self) -> &str;

    /// Generate text from messages.
    async fn generate_text(
        &self,
        messages: &[AIMessage],
        options: &GenerateOptions,
    ) -> Result<AIResponse, ProviderError>;
}
