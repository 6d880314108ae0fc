//! REST client for the incident API.

use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::IncidentConfig;
use crate::error::{IncidentError, IncidentResult};
use crate::models::{
    Incident, IncidentFilter, IncidentList, IncidentUpdate, Monitor, MonitorList, NewIncident,
    NewMonitor, SOURCE,
};

/// Header carrying the optional organization scope.
const ORG_HEADER: &str = "X-Portia-Org-ID";

/// Wait before retrying after the `attempt`-th (0-based) rate-limited response.
///
/// Doubles per attempt: `unit`, `2 * unit`, `4 * unit`, ...
#[must_use]
pub fn backoff_delay(unit: Duration, attempt: u32) -> Duration {
    unit.saturating_mul(1_u32 << attempt.min(16))
}

/// Incident API client.
///
/// Every call is a single JSON request retried under the policy in
/// [`IncidentConfig`]: 429 backs off exponentially, 401 aborts at once, any
/// other failure waits `retry_delay` and tries again until the attempt cap.
#[derive(Debug, Clone)]
pub struct IncidentClient {
    config: IncidentConfig,
    client: reqwest::Client,
}

impl IncidentClient {
    /// Create a client from a configuration.
    ///
    /// # Errors
    /// Returns an error if a configured header is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: IncidentConfig) -> IncidentResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("uptime-healer/", env!("CARGO_PKG_VERSION"))),
        );

        if let Some(ref key) = config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| IncidentError::InvalidHeader("Authorization"))?;
            headers.insert(AUTHORIZATION, value);
        }

        if let Some(ref org_id) = config.org_id {
            let value =
                HeaderValue::from_str(org_id).map_err(|_| IncidentError::InvalidHeader(ORG_HEADER))?;
            headers.insert(ORG_HEADER, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        if config.enabled() {
            debug!(base_url = %config.base_url, "Incident API client initialized");
        } else {
            warn!("Incident API key not configured - incident reporting disabled");
        }

        Ok(Self { config, client })
    }

    /// Create a client from `PORTIA_*` environment variables.
    ///
    /// # Errors
    /// See [`IncidentClient::new`].
    pub fn from_env() -> IncidentResult<Self> {
        Self::new(IncidentConfig::from_env())
    }

    /// Whether calls will be attempted at all.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.enabled()
    }

    /// The configuration this client was built from.
    #[must_use]
    pub fn config(&self) -> &IncidentConfig {
        &self.config
    }

    /// Perform one logical call with the retry policy applied.
    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
        params: &[(&str, String)],
    ) -> IncidentResult<Value> {
        if !self.enabled() {
            return Err(IncidentError::Disabled);
        }

        let url = format!("{}{endpoint}", self.config.base_url.trim_end_matches('/'));
        let max_attempts = self.config.retry_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            let is_last = attempt + 1 == max_attempts;
            let mut request = self.client.request(method.clone(), &url);
            if !params.is_empty() {
                request = request.query(params);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(%method, %url, attempt = attempt + 1, max_attempts, "Incident API request");

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let text = response.text().await?;
                    if text.trim().is_empty() {
                        return Ok(Value::Null);
                    }
                    return Ok(serde_json::from_str(&text)?);
                }
                Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {
                    warn!(%url, "Incident API authentication failed - check API key");
                    return Err(IncidentError::Unauthorized);
                }
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    last_error = "rate limited (429)".to_string();
                    if !is_last {
                        let wait = backoff_delay(self.config.backoff_unit, attempt);
                        warn!(
                            %url,
                            attempt = attempt + 1,
                            wait_ms = wait.as_millis() as u64,
                            "Incident API rate limited - backing off"
                        );
                        tokio::time::sleep(wait).await;
                    }
                    // The backoff stands in for the fixed retry delay.
                    continue;
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    warn!(%url, status = %status, body = %body, "Incident API request failed");
                    last_error = format!("{status}: {body}");
                }
                Err(e) if e.is_timeout() => {
                    warn!(%url, attempt = attempt + 1, max_attempts, "Incident API request timeout");
                    last_error = "timeout".to_string();
                }
                Err(e) => {
                    warn!(%url, error = %e, "Incident API request error");
                    last_error = e.to_string();
                }
            }

            if !is_last {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        warn!(%url, attempts = max_attempts, "All incident API attempts failed");
        Err(IncidentError::RetriesExhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    async fn request_as<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
        params: &[(&str, String)],
    ) -> IncidentResult<T> {
        let value = self.request(method, endpoint, body, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    // =========================================================================
    // Incidents
    // =========================================================================

    /// Create a new incident.
    pub async fn create_incident(&self, incident: &NewIncident) -> IncidentResult<Incident> {
        let created: Incident = self
            .request_as(
                Method::POST,
                &self.config.endpoints.create_incident,
                Some(incident),
                &[],
            )
            .await?;
        info!(
            incident_id = ?created.key(),
            title = %incident.title,
            "Incident created"
        );
        Ok(created)
    }

    /// Update fields of an existing incident.
    pub async fn update_incident(
        &self,
        incident_id: &str,
        update: &IncidentUpdate,
    ) -> IncidentResult<Value> {
        let mut body = serde_json::to_value(update)?;
        if let Value::Object(ref mut map) = body {
            map.insert("incident_id".to_string(), json!(incident_id));
            map.insert("updated_at".to_string(), json!(Utc::now()));
        }
        let result = self
            .request(Method::PUT, &self.config.endpoints.update_incident, Some(&body), &[])
            .await?;
        info!(incident_id, "Incident updated");
        Ok(result)
    }

    /// Fetch one incident.
    pub async fn get_incident(&self, incident_id: &str) -> IncidentResult<Incident> {
        self.request_as::<Incident, Value>(
            Method::GET,
            &self.config.endpoints.get_incident,
            None,
            &[("incident_id", incident_id.to_string())],
        )
        .await
    }

    /// List incidents matching a filter.
    pub async fn list_incidents(&self, filter: &IncidentFilter) -> IncidentResult<Vec<Incident>> {
        let list: IncidentList = self
            .request_as::<IncidentList, Value>(
                Method::GET,
                &self.config.endpoints.list_incidents,
                None,
                &filter.query(),
            )
            .await?;
        debug!(count = list.incidents.len(), "Listed incidents");
        Ok(list.incidents)
    }

    /// Send a free-form incident report about `url`.
    pub async fn report_incident(&self, url: &str, incident: &Value) -> IncidentResult<()> {
        let payload = json!({
            "url": url,
            "incident": incident,
            "timestamp": Utc::now(),
            "agent": SOURCE,
            "version": env!("CARGO_PKG_VERSION"),
        });
        self.request(
            Method::POST,
            &self.config.endpoints.incident_report,
            Some(&payload),
            &[],
        )
        .await?;
        info!(url, "Incident report sent");
        Ok(())
    }

    // =========================================================================
    // Monitors
    // =========================================================================

    /// Register a monitoring endpoint.
    pub async fn create_monitor(&self, monitor: &NewMonitor) -> IncidentResult<Monitor> {
        let created: Monitor = self
            .request_as(
                Method::POST,
                &self.config.endpoints.monitor_create,
                Some(monitor),
                &[],
            )
            .await?;
        info!(name = %monitor.name, url = %monitor.url, "Monitor created");
        Ok(created)
    }

    /// Update fields of a monitor. `fields` must be a JSON object.
    pub async fn update_monitor(&self, monitor_id: &str, fields: Value) -> IncidentResult<Value> {
        let mut body = match fields {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        body.insert("monitor_id".to_string(), json!(monitor_id));
        body.insert("updated_at".to_string(), json!(Utc::now()));

        let result = self
            .request(
                Method::PUT,
                &self.config.endpoints.monitor_update,
                Some(&Value::Object(body)),
                &[],
            )
            .await?;
        info!(monitor_id, "Monitor updated");
        Ok(result)
    }

    /// Delete a monitor.
    pub async fn delete_monitor(&self, monitor_id: &str) -> IncidentResult<()> {
        self.request(
            Method::DELETE,
            &self.config.endpoints.monitor_delete,
            Some(&json!({ "monitor_id": monitor_id })),
            &[],
        )
        .await?;
        info!(monitor_id, "Monitor deleted");
        Ok(())
    }

    /// List all monitors.
    pub async fn list_monitors(&self) -> IncidentResult<Vec<Monitor>> {
        let list: MonitorList = self
            .request_as::<MonitorList, Value>(
                Method::GET,
                &self.config.endpoints.monitor_list,
                None,
                &[],
            )
            .await?;
        debug!(count = list.monitors.len(), "Listed monitors");
        Ok(list.monitors)
    }

    /// Current status of one monitor.
    pub async fn monitor_status(&self, monitor_id: &str) -> IncidentResult<Value> {
        self.request::<Value>(
            Method::GET,
            &self.config.endpoints.monitor_status,
            None,
            &[("monitor_id", monitor_id.to_string())],
        )
        .await
    }

    /// Whether the API is reachable with the configured credentials.
    pub async fn health_check(&self) -> bool {
        match self.list_monitors().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Incident API health check failed");
                false
            }
        }
    }
}
