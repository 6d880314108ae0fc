//! Request and response types for the incident API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name this agent reports itself as.
pub const SOURCE: &str = "uptime-healer";

/// Incident severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Incident lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Investigating,
    Resolved,
}

/// An incident as returned by the API.
///
/// Only the fields this agent reads are typed; everything else is kept in
/// `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Incident {
    #[serde(default)]
    pub incident_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub monitor_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Incident {
    /// Identifier, whichever key the API used for it.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.incident_id.as_deref().or(self.id.as_deref())
    }
}

/// A monitor as returned by the API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Monitor {
    #[serde(default)]
    pub monitor_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Monitor {
    /// Identifier, whichever key the API used for it.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.monitor_id.as_deref().or(self.id.as_deref())
    }
}

/// Body of a create-incident call.
#[derive(Debug, Clone, Serialize)]
pub struct NewIncident {
    pub monitor_id: String,
    pub title: String,
    pub description: String,
    pub severity: IncidentSeverity,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
    pub source: &'static str,
}

impl NewIncident {
    /// Create an open incident with the given severity.
    #[must_use]
    pub fn open(
        monitor_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        severity: IncidentSeverity,
    ) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            title: title.into(),
            description: description.into(),
            severity,
            status: IncidentStatus::Open,
            created_at: Utc::now(),
            source: SOURCE,
        }
    }
}

/// Partial update of an incident. Unset fields are omitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IncidentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<IncidentSeverity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl IncidentUpdate {
    /// Mark an incident resolved with a note.
    #[must_use]
    pub fn resolved(resolution: impl Into<String>) -> Self {
        Self {
            status: Some(IncidentStatus::Resolved),
            severity: None,
            resolution: Some(resolution.into()),
        }
    }
}

/// Body of a create-monitor call.
#[derive(Debug, Clone, Serialize)]
pub struct NewMonitor {
    pub name: String,
    pub url: String,
    pub check_interval: u64,
    pub alert_channels: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl NewMonitor {
    /// Monitor for `url`, checked every `check_interval` seconds, alerting via Telegram.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>, check_interval: u64) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            check_interval,
            alert_channels: vec!["telegram".to_string()],
            created_at: Utc::now(),
        }
    }
}

/// Filter for listing incidents.
#[derive(Debug, Clone)]
pub struct IncidentFilter {
    pub monitor_id: Option<String>,
    pub status: Option<IncidentStatus>,
    pub limit: u32,
}

impl Default for IncidentFilter {
    fn default() -> Self {
        Self {
            monitor_id: None,
            status: None,
            limit: 50,
        }
    }
}

impl IncidentFilter {
    pub(crate) fn query(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("limit", self.limit.to_string())];
        if let Some(ref monitor_id) = self.monitor_id {
            params.push(("monitor_id", monitor_id.clone()));
        }
        if let Some(status) = self.status {
            let status = match status {
                IncidentStatus::Open => "open",
                IncidentStatus::Investigating => "investigating",
                IncidentStatus::Resolved => "resolved",
            };
            params.push(("status", status.to_string()));
        }
        params
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct IncidentList {
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MonitorList {
    #[serde(default)]
    pub monitors: Vec<Monitor>,
}
