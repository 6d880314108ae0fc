//! Notification event types for uptime-healer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity levels for alerts and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - normal operations
    Info,
    /// Warning - something needs attention
    Warning,
    /// Critical - immediate action required
    Critical,
}

impl Severity {
    /// Get the marker prefixed to plain-text messages of this severity.
    #[must_use]
    pub const fn marker(&self) -> &'static str {
        match self {
            Self::Info => "✅",
            Self::Warning => "⚠️",
            Self::Critical => "🚨",
        }
    }

    /// Get display name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
        }
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    // =========================================================================
    // Probe verdicts
    // =========================================================================
    /// The monitored site failed a check
    SiteDown {
        url: String,
        error: String,
        down_count: u32,
        threshold: u32,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The monitored site answered again after one or more failed checks
    SiteRecovered {
        url: String,
        #[serde(default)]
        latency_secs: Option<f64>,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Remediation outcomes
    // =========================================================================
    /// A fix pull request was opened
    RemediationOpened {
        url: String,
        error: String,
        priority: String,
        root_cause: String,
        files_modified: usize,
        pr_number: u64,
        pr_url: String,
        branch: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The automatic fix could not be produced or submitted
    RemediationFailed {
        url: String,
        reason: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// Manual connectivity test
    Test {
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    /// Get a short title for this event type.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::SiteDown { .. } => "UPTIME ALERT".to_string(),
            Self::SiteRecovered { .. } => "WEBSITE RECOVERED".to_string(),
            Self::RemediationOpened { pr_number, .. } => {
                format!("AUTO-FIX OPENED: PR #{pr_number}")
            }
            Self::RemediationFailed { .. } => "AUTO-FIX FAILED".to_string(),
            Self::Test { .. } => "TEST NOTIFICATION".to_string(),
        }
    }

    /// Get the severity for this event.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::SiteDown { .. } | Self::RemediationOpened { .. } => Severity::Critical,
            Self::RemediationFailed { .. } => Severity::Warning,
            Self::SiteRecovered { .. } | Self::Test { .. } => Severity::Info,
        }
    }

    /// Get the timestamp for this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::SiteDown { timestamp, .. }
            | Self::SiteRecovered { timestamp, .. }
            | Self::RemediationOpened { timestamp, .. }
            | Self::RemediationFailed { timestamp, .. }
            | Self::Test { timestamp } => *timestamp,
        }
    }

    /// Render the event as the plain-text body of a chat message.
    #[must_use]
    pub fn render(&self) -> String {
        let time = self.timestamp().format("%Y-%m-%d %H:%M:%S UTC");
        let header = format!("{} {}", self.severity().marker(), self.title());

        let body = match self {
            Self::SiteDown {
                url,
                error,
                down_count,
                threshold,
                ..
            } => {
                let next = if down_count >= threshold {
                    "Attempting automatic resolution..."
                } else {
                    "Waiting for the down threshold before attempting a fix."
                };
                format!(
                    "Website: {url}\nStatus: DOWN\nError: {error}\nConsecutive failures: {down_count}/{threshold}\nTime: {time}\n\n{next}"
                )
            }

            Self::SiteRecovered {
                url, latency_secs, ..
            } => {
                let latency = latency_secs
                    .map_or_else(|| "Unknown".to_string(), |s| format!("{s:.3}s"));
                format!(
                    "Website: {url}\nStatus: UP\nResponse Time: {latency}\nTime: {time}\n\nThe website is now accessible again."
                )
            }

            Self::RemediationOpened {
                url,
                error,
                priority,
                root_cause,
                files_modified,
                pr_number,
                pr_url,
                branch,
                ..
            } => format!(
                "Website: {url}\nError: {error}\n\nAI Analysis:\nPriority: {priority}\nRoot Cause: {root_cause}\n\nAutomatic Fix:\n- Files Modified: {files_modified}\n- Pull Request: #{pr_number} ({pr_url})\n- Branch: {branch}\n\nReview and merge the PR to restore website functionality."
            ),

            Self::RemediationFailed { url, reason, .. } => {
                format!("Website: {url}\nReason: {reason}\nTime: {time}\n\nManual investigation required.")
            }

            Self::Test { .. } => format!("uptime-healer can reach this chat.\nTime: {time}"),
        };

        format!("{header}\n\n{body}")
    }
}
