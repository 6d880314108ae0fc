//! Google Gemini provider implementation (`generateContent` REST API).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use std::time::Duration;

use super::provider::{
    http_client, timeout_from_env, AIMessage, AIProvider, AIResponse, AIRole, GenerateOptions,
    ProviderError, TokenUsage, DEFAULT_TIMEOUT,
};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

const PROVIDER: &str = "gemini";

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_field_names)]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: UsageMetadata,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

/// Gemini provider.
pub struct GeminiProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http_client(DEFAULT_TIMEOUT),
            api_key: Some(api_key.into()),
            base_url: GEMINI_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create from `GOOGLE_AI_API_KEY` and `GEMINI_MODEL`.
    pub fn from_env() -> Self {
        Self {
            client: http_client(timeout_from_env()),
            api_key: std::env::var("GOOGLE_AI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            base_url: GEMINI_API_URL.to_string(),
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }

    /// Set a custom base URL (proxies, tests).
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
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    /// Split system messages into the system instruction; everything else
    /// becomes a content turn.
    fn build_request(messages: &[AIMessage], options: &GenerateOptions) -> GeminiRequest {
        let system: Vec<Part> = messages
            .iter()
            .filter(|m| m.role == AIRole::System)
            .map(|m| Part {
                text: m.content.clone(),
            })
            .collect();

        let contents = messages
            .iter()
            .filter(|m| m.role != AIRole::System)
            .map(|m| Content {
                role: Some(match m.role {
                    AIRole::Assistant => "model",
                    _ => "user",
                }),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .collect();

        GeminiRequest {
            contents,
            system_instruction: (!system.is_empty()).then_some(Content {
                role: None,
                parts: system,
            }),
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
                response_mime_type: options.json_mode.then_some("application/json"),
            },
        }
    }
}

#[async_trait]
impl AIProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn api_key_env_var(&self) -> &'static str {
        "GOOGLE_AI_API_KEY"
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
            .ok_or(ProviderError::NotConfigured("GOOGLE_AI_API_KEY"))?;

        let request = Self::build_request(messages, options);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key.as_str())
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
            let message = serde_json::from_str::<GeminiErrorResponse>(&body)
                .map_or(body, |e| e.error.message);
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        let api_response: GeminiResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
                provider: PROVIDER,
                reason: e.to_string(),
            })?;

        let text: String = api_response
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::EmptyResponse(PROVIDER));
        }

        Ok(AIResponse {
            text,
            usage: TokenUsage {
                input_tokens: api_response.usage_metadata.prompt_token_count,
                output_tokens: api_response.usage_metadata.candidates_token_count,
                total_tokens: api_response.usage_metadata.total_token_count,
            },
            model: api_response
                .model_version
                .unwrap_or_else(|| self.model.clone()),
            provider: PROVIDER.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_request_shape() {
        let messages = vec![AIMessage::system("be terse"), AIMessage::user("hello")];
        let options = GenerateOptions {
            json_mode: true,
            ..GenerateOptions::default()
        };
        let value = serde_json::to_value(GeminiProvider::build_request(&messages, &options)).unwrap();

        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
    }

    #[tokio::test]
    async fn test_generate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({"contents": [{"parts": [{"text": "hi"}]}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}],
                "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("test-key").with_base_url(server.uri());
        let response = provider
            .generate_text(&[AIMessage::user("hi")], &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(response.text, "{\"a\":1}");
        assert_eq!(response.usage.total_tokens, 5);
        assert_eq!(response.model, DEFAULT_MODEL);
        assert_eq!(response.provider, "gemini");
    }

    #[tokio::test]
    async fn test_api_error_message_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "API key invalid", "status": "PERMISSION_DENIED"}
            })))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("bad").with_base_url(server.uri());
        let err = provider
            .generate_text(&[AIMessage::user("hi")], &GenerateOptions::default())
            .await
            .unwrap_err();

        match err {
            ProviderError::Api { status, message, .. } => {
                assert_eq!(status, 403);
                assert_eq!(message, "API key invalid");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_candidates_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("k").with_base_url(server.uri());
        let err = provider
            .generate_text(&[AIMessage::user("hi")], &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse("gemini")));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let provider = GeminiProvider {
            client: Client::new(),
            api_key: None,
            base_url: GEMINI_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        };
        assert!(!provider.is_configured());
        let err = provider
            .generate_text(&[AIMessage::user("hi")], &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured("GOOGLE_AI_API_KEY")));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_leak_key() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = GeminiProvider::new("AIzaSECRETKEY123").with_base_url(format!("http://{addr}"));
        let err = provider
            .generate_text(&[AIMessage::user("hi")], &GenerateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Request { .. }));
        let rendered = format!("{err} {err:?}");
        assert!(!rendered.contains("AIzaSECRETKEY123"), "{rendered}");
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"candidates": []}))
                    .set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("k")
            .with_base_url(server.uri())
            .with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = provider
            .generate_text(&[AIMessage::user("hi")], &GenerateOptions::default())
            .await
            .unwrap_err();

        match err {
            ProviderError::Request { source, .. } => assert!(source.is_timeout()),
            other => panic!("unexpected error: {other}"),
        }
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
