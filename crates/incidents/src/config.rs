//! Configuration for the incident API client.

use std::env;
use std::time::Duration;

/// Placeholder org id shipped in sample `.env` files; treated as unset.
const ORG_ID_PLACEHOLDER: &str = "your_actual_org_id_from_dashboard";

/// Incident API client configuration.
#[derive(Debug, Clone)]
pub struct IncidentConfig {
    /// API base URL.
    pub base_url: String,
    /// Bearer token. `None` disables the client.
    pub api_key: Option<String>,
    /// Optional organization scope, sent as `X-Portia-Org-ID`.
    pub org_id: Option<String>,
    /// Per-request timeout (default: 30 seconds).
    pub timeout: Duration,
    /// Attempts per call, including the first (default: 3).
    pub retry_attempts: u32,
    /// Unit of the rate-limit backoff; a 429 on attempt `n` waits `unit * 2^n`.
    pub backoff_unit: Duration,
    /// Fixed wait after transport errors and other non-success responses.
    pub retry_delay: Duration,
    /// Endpoint paths, relative to `base_url`.
    pub endpoints: Endpoints,
}

impl IncidentConfig {
    /// Create a configuration for the given base URL and key with default policy.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            org_id: None,
            timeout: Duration::from_secs(30),
            retry_attempts: 3,
            backoff_unit: Duration::from_secs(1),
            retry_delay: Duration::from_secs(1),
            endpoints: Endpoints::default(),
        }
    }

    /// Load configuration from `PORTIA_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::new(
            env::var("PORTIA_BASE_URL").unwrap_or_else(|_| "https://api.portialabs.ai".to_string()),
            env::var("PORTIA_API_KEY").ok().filter(|s| !s.is_empty()),
        );

        config.org_id = env::var("PORTIA_ORG_ID")
            .ok()
            .filter(|s| !s.is_empty() && s != ORG_ID_PLACEHOLDER);
        config.timeout = Duration::from_secs(
            env::var("PORTIA_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        );
        config.retry_attempts = env::var("PORTIA_RETRY_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        config
    }

    /// Whether an API key is configured.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// API key with all but the first few characters masked, for display.
    #[must_use]
    pub fn redacted_key(&self) -> Option<String> {
        self.api_key.as_deref().map(|key| {
            let visible: String = key.chars().take(6).collect();
            format!("{visible}...")
        })
    }
}

/// Logical endpoint paths of the incident API.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub monitor_status: String,
    pub incident_report: String,
    pub create_incident: String,
    pub update_incident: String,
    pub get_incident: String,
    pub list_incidents: String,
    pub monitor_create: String,
    pub monitor_update: String,
    pub monitor_delete: String,
    pub monitor_list: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            monitor_status: "/v1/monitors/status".to_string(),
            incident_report: "/v1/incidents/report".to_string(),
            create_incident: "/v1/incidents/create".to_string(),
            update_incident: "/v1/incidents/update".to_string(),
            get_incident: "/v1/incidents/get".to_string(),
            list_incidents: "/v1/incidents/list".to_string(),
            monitor_create: "/v1/monitors/create".to_string(),
            monitor_update: "/v1/monitors/update".to_string(),
            monitor_delete: "/v1/monitors/delete".to_string(),
            monitor_list: "/v1/monitors/list".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_from_env_defaults_and_placeholder_org() {
        env::remove_var("PORTIA_API_KEY");
        env::remove_var("PORTIA_TIMEOUT");
        env::set_var("PORTIA_ORG_ID", ORG_ID_PLACEHOLDER);

        let config = IncidentConfig::from_env();
        env::remove_var("PORTIA_ORG_ID");

        assert!(!config.enabled());
        assert!(config.org_id.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.endpoints.create_incident, "/v1/incidents/create");
    }

    #[test]
    fn test_redacted_key() {
        let config = IncidentConfig::new("http://x", Some("pk-1234567890".to_string()));
        assert_eq!(config.redacted_key().as_deref(), Some("pk-123..."));
    }
}
