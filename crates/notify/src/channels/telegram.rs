//! Telegram bot notification channel.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::NotifyChannel;

/// Environment variable for the Telegram bot token.
const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";

/// Environment variable for the Telegram chat that receives messages.
const ENV_TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

/// Environment variable overriding the Bot API base URL.
const ENV_TELEGRAM_API_BASE: &str = "TELEGRAM_API_BASE";

/// Telegram Bot API base URL.
const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Telegram bot channel, addressed by bot token and chat id.
pub struct TelegramChannel {
    bot_token: Option<String>,
    chat_id: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let bot_token = std::env::var(ENV_TELEGRAM_BOT_TOKEN)
            .ok()
            .filter(|s| !s.is_empty());
        let chat_id = std::env::var(ENV_TELEGRAM_CHAT_ID)
            .ok()
            .filter(|s| !s.is_empty());
        let api_base =
            std::env::var(ENV_TELEGRAM_API_BASE).unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        if bot_token.is_some() && chat_id.is_some() {
            debug!("Telegram notifications enabled");
        } else {
            debug!("Telegram notifications disabled (TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID not set)");
        }

        Self {
            bot_token,
            chat_id,
            api_base,
            client: build_client(),
        }
    }

    /// Create a Telegram channel with explicit credentials.
    #[must_use]
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: Some(bot_token.into()),
            chat_id: Some(chat_id.into()),
            api_base: DEFAULT_API_BASE.to_string(),
            client: build_client(),
        }
    }

    /// Point the channel at a different Bot API host.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn endpoint(&self, token: &str) -> String {
        format!(
            "{}/bot{token}/sendMessage",
            self.api_base.trim_end_matches('/')
        )
    }
}

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

#[async_trait]
impl NotifyChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn enabled(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    async fn send(&self, text: &str) -> Result<(), ChannelError> {
        let token = self
            .bot_token
            .as_deref()
            .ok_or_else(|| ChannelError::NotConfigured(ENV_TELEGRAM_BOT_TOKEN.to_string()))?;
        let chat_id = self
            .chat_id
            .as_deref()
            .ok_or_else(|| ChannelError::NotConfigured(ENV_TELEGRAM_CHAT_ID.to_string()))?;

        let form = SendMessage { chat_id, text };

        debug!(channel = "telegram", chars = text.len(), "Sending notification");

        let response = self
            .client
            .post(self.endpoint(token))
            .form(&form)
            .send()
            .await?;

        if response.status().is_success() {
            debug!(channel = "telegram", "Notification sent successfully");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            warn!(
                channel = "telegram",
                status = %status,
                body = %body,
                "Telegram sendMessage request failed"
            );

            Err(ChannelError::Rejected {
                channel: "telegram",
                status: status.as_u16(),
                body,
            })
        }
    }
}

// =============================================================================
// Telegram API types
// =============================================================================

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_posts_form_to_bot_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botabc123/sendMessage"))
            .and(body_string_contains("chat_id=42"))
            .and(body_string_contains("text=hello"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let channel = TelegramChannel::new("abc123", "42").with_api_base(server.uri());
        channel.send("hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_send_reports_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let channel = TelegramChannel::new("abc123", "42").with_api_base(server.uri());
        let err = channel.send("hello").await.unwrap_err();

        match err {
            ChannelError::Rejected { status, .. } => assert_eq!(status, 403),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let channel = TelegramChannel::new("t", "c").with_api_base("http://localhost:9/");
        assert_eq!(channel.endpoint("t"), "http://localhost:9/bott/sendMessage");
    }
}
