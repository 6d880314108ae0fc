//! Chat notifications for uptime-healer.
//!
//! Notifications are best-effort: a failed or unconfigured channel is logged
//! and reported as `false`, never raised to the caller, and never retried.
//!
//! # Usage
//!
//! ```no_run
//! use notify::{Notifier, NotifyEvent};
//!
//! # async fn example() {
//! let notifier = Notifier::from_env();
//!
//! let delivered = notifier
//!     .notify(&NotifyEvent::SiteDown {
//!         url: "https://example.com".to_string(),
//!         error: "HTTP 503".to_string(),
//!         down_count: 1,
//!         threshold: 2,
//!         timestamp: chrono::Utc::now(),
//!     })
//!     .await;
//! # let _ = delivered;
//! # }
//! ```
//!
//! # Configuration
//!
//! - `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID`: enable the Telegram channel
//! - `NOTIFY_DISABLED`: Set to "true" to disable all notifications

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod events;

pub use channels::telegram::TelegramChannel;
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use events::{NotifyEvent, Severity};

use std::sync::Arc;
use tracing::{debug, info, warn};

/// Environment variable to disable all notifications.
const ENV_NOTIFY_DISABLED: &str = "NOTIFY_DISABLED";

/// Central notification dispatcher.
///
/// The `Notifier` holds the configured channels and delivers each message to
/// all of them in turn.
#[derive(Clone)]
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    disabled: bool,
}

impl Notifier {
    /// Create a new notifier from environment variables.
    ///
    /// This will auto-detect which channels are configured based on
    /// environment variables and enable them accordingly.
    #[must_use]
    pub fn from_env() -> Self {
        let disabled = std::env::var(ENV_NOTIFY_DISABLED)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if disabled {
            info!("Notifications disabled via NOTIFY_DISABLED");
            return Self::disabled();
        }

        let mut channels: Vec<Arc<dyn NotifyChannel>> = vec![];

        let telegram = TelegramChannel::from_env();
        if telegram.enabled() {
            info!("Telegram notifications enabled");
            channels.push(Arc::new(telegram));
        }

        if channels.is_empty() {
            warn!("No notification channels configured");
        } else {
            info!(
                channel_count = channels.len(),
                "Notification system initialized"
            );
        }

        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a disabled notifier (for testing or when notifications are off).
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            channels: vec![],
            disabled: true,
        }
    }

    /// Check if any notification channels are enabled.
    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.disabled && !self.channels.is_empty()
    }

    /// Get the number of enabled channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        if self.disabled {
            0
        } else {
            self.channels.len()
        }
    }

    /// Send a plain-text message to every enabled channel.
    ///
    /// Returns `true` when at least one channel accepted the message. Missing
    /// credentials and delivery failures are logged as warnings.
    pub async fn send(&self, message: &str) -> bool {
        if self.disabled {
            debug!("Notifications disabled, skipping message");
            return false;
        }

        if self.channels.is_empty() {
            warn!("Chat credentials missing, notification not sent");
            return false;
        }

        let mut delivered = false;

        for channel in &self.channels {
            let channel_name = channel.name();

            if !channel.enabled() {
                debug!(channel = channel_name, "Channel disabled, skipping");
                continue;
            }

            match channel.send(message).await {
                Ok(()) => {
                    info!(channel = channel_name, "Notification sent");
                    delivered = true;
                }
                Err(e) => {
                    warn!(
                        channel = channel_name,
                        error = %e,
                        "Failed to send notification"
                    );
                }
            }
        }

        delivered
    }

    /// Render an event and send it to every enabled channel.
    pub async fn notify(&self, event: &NotifyEvent) -> bool {
        debug!(event = %event.title(), severity = event.severity().as_str(), "Dispatching event");
        self.send(&event.render()).await
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::from_env()
    }
}
