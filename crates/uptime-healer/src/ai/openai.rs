//! OpenAI-compatible chat completions provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use std::time::Duration;

use super::provider::{
    http_client, timeout_from_env, AIMessage, AIProvider, AIResponse, AIRole, GenerateOptions,
    ProviderError, TokenUsage, DEFAULT_TIMEOUT,
};

const OPENAI_API_URL: &str = "https://api.openai.com";

/// Default model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const PROVIDER: &str = "openai";

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIChoiceMessage,
}

#[derive(Debug, Default, Deserialize)]
#[allow(clippy::struct_field_names)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: OpenAIUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

/// OpenAI (or compatible endpoint) provider.
pub struct OpenAIProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http_client(DEFAULT_TIMEOUT),
            api_key: Some(api_key.into()),
            base_url: OPENAI_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create from `OPENAI_API_KEY`, `OPENAI_MODEL` and `OPENAI_BASE_URL`.
    pub fn from_env() -> Self {
        Self {
            client: http_client(timeout_from_env()),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| OPENAI_API_URL.to_string()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }

    /// Set a custom base URL (Azure OpenAI, local gateways, tests).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Bound each generation call by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn convert_messages(messages: &[AIMessage]) -> Vec<OpenAIMessage> {
        messages
            .iter()
            .map(|msg| OpenAIMessage {
                role: match msg.role {
                    AIRole::System => "system",
                    AIRole::User => "user",
                    AIRole::Assistant => "assistant",
                },
                content: msg.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl AIProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn api_key_env_var(&self) -> &'static str {
        "OPENAI_API_KEY"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_text(
        &self,
        messages: &[AIMessage],
        options: &GenerateOptions,
    ) -> Result<AIResponse, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(ProviderError::NotConfigured("OPENAI_API_KEY"))?;

        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: Self::convert_messages(messages),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            response_format: options.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|source| ProviderError::request(PROVIDER, source))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ProviderError::request(PROVIDER, source))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenAIErrorResponse>(&body)
                .map_or(body, |e| e.error.message);
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        let api_response: OpenAIResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
                provider: PROVIDER,
                reason: e.to_string(),
            })?;

        // Extract text from first choice
        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::EmptyResponse(PROVIDER));
        }

        Ok(AIResponse {
            text,
            usage: TokenUsage {
                input_tokens: api_response.usage.prompt_tokens,
                output_tokens: api_response.usage.completion_tokens,
                total_tokens: api_response.usage.total_tokens,
            },
            model: api_response.model.unwrap_or_else(|| self.model.clone()),
            provider: PROVIDER.to_string(),
        })
    }
}
