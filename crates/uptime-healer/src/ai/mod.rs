//! Text-generation providers used for diagnosis.

pub mod gemini;
pub mod openai;
pub mod provider;

use std::sync::Arc;

pub use gemini::GeminiProvider;
pub use openai::OpenAIProvider;
pub use provider::{AIMessage, AIProvider, AIResponse, AIRole, GenerateOptions, ProviderError, TokenUsage};

/// Select a provider from `AI_PROVIDER` (default `gemini`).
pub fn provider_from_env() -> Result<Arc<dyn AIProvider>, ProviderError> {
    let name = std::env::var("AI_PROVIDER").unwrap_or_else(|_| "gemini".to_string());
    provider_by_name(&name)
}

/// Build a provider by name, reading its credentials from the environment.
pub fn provider_by_name(name: &str) -> Result<Arc<dyn AIProvider>, ProviderError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | "gemini" | "google" => Ok(Arc::new(GeminiProvider::from_env())),
        "openai" => Ok(Arc::new(OpenAIProvider::from_env())),
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}
