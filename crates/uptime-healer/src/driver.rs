//! One monitoring cycle: probe, transition, execute.
//!
//! Collaborators are isolated from each other. A failed chat message never
//! prevents the incident call or the fix PR, and vice versa; each failure is
//! logged and recorded in the [`CycleReport`].

use std::sync::Arc;

use chrono::Utc;
use incidents::{IncidentClient, IncidentSeverity, IncidentStatus, IncidentUpdate, NewIncident};
use notify::{NotifyEvent, Notifier};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::diagnose::{Diagnoser, DiagnosisOutcome};
use crate::escalation::{transition, Action, EscalationState};
use crate::probe::{CheckResult, Prober};
use crate::remediate::{DowntimeContext, PullRequestRef, RemediationError, Remediator};
use crate::state::{PersistedState, StateStore};

/// Monitor id used for incidents opened by this agent.
pub const MONITOR_ID: &str = "uptime-healer";

/// What the remediation step did this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationOutcome {
    /// A fix pull request was opened.
    Opened(PullRequestRef),
    /// Diagnosis or remediation is not configured.
    Skipped(String),
    /// No usable diagnosis; the episode stops here.
    NotDiagnosed(String),
    /// Another process is remediating the same repository.
    AlreadyRunning,
    Failed(String),
}

/// Summary of one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub check: CheckResult,
    pub state: EscalationState,
    pub actions: Vec<Action>,
    /// Downtime alerts delivered.
    pub alerts_sent: usize,
    /// Whether the recovery notice was delivered.
    pub recovery_sent: bool,
    pub incident_id: Option<String>,
    pub remediation: Option<RemediationOutcome>,
}

/// Runs monitoring cycles against one URL.
pub struct Driver {
    url: String,
    threshold: u32,
    prober: Prober,
    notifier: Notifier,
    store: Option<StateStore>,
    state: PersistedState,
    incidents: Option<IncidentClient>,
    diagnoser: Option<Diagnoser>,
    remediator: Option<Arc<dyn Remediator>>,
}

impl Driver {
    #[must_use]
    pub fn new(url: impl Into<String>, threshold: u32, prober: Prober, notifier: Notifier) -> Self {
        Self {
            url: url.into(),
            threshold: threshold.max(1),
            prober,
            notifier,
            store: None,
            state: PersistedState::default(),
            incidents: None,
            diagnoser: None,
            remediator: None,
        }
    }

    /// Persist state to `store`, starting from whatever it holds.
    #[must_use]
    pub fn with_state_store(mut self, store: StateStore) -> Self {
        self.state = store.load();
        debug!(
            path = %store.path().display(),
            down_count = self.state.escalation.consecutive_down_count,
            "Loaded escalation state"
        );
        self.store = Some(store);
        self
    }

    /// Mirror events to the incident API. Disabled clients are ignored.
    #[must_use]
    pub fn with_incidents(mut self, client: IncidentClient) -> Self {
        self.incidents = client.enabled().then_some(client);
        self
    }

    #[must_use]
    pub fn with_diagnoser(mut self, diagnoser: Diagnoser) -> Self {
        self.diagnoser = Some(diagnoser);
        self
    }

    #[must_use]
    pub fn with_remediator(mut self, remediator: Arc<dyn Remediator>) -> Self {
        self.remediator = Some(remediator);
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    #[must_use]
    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    /// Run one check cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let check = self.prober.check(&self.url).await;
        if check.is_up() {
            info!(
                url = %self.url,
                status = check.http_status,
                latency_ms = check.latency.map(|l| l.as_millis() as u64),
                "Site is UP"
            );
        } else {
            warn!(url = %self.url, status = check.http_status, error = %check.error(), "Site is DOWN");
        }

        let next = transition(&self.state.escalation, &check, self.threshold);
        self.state.escalation = next.state;
        self.state.updated_at = Some(Utc::now());
        self.persist();

        let mut report = CycleReport {
            check,
            state: next.state,
            actions: next.actions.clone(),
            alerts_sent: 0,
            recovery_sent: false,
            incident_id: None,
            remediation: None,
        };

        for action in &next.actions {
            match *action {
                Action::Alert { down_count } => {
                    if self.alert(&report.check, down_count).await {
                        report.alerts_sent += 1;
                    }
                }
                Action::ReportIncident { severity } => {
                    self.report_incident(&report.check, severity).await;
                }
                Action::Remediate => {
                    report.remediation = Some(self.remediate(&report.check).await);
                }
                Action::Recover { previous_down_count } => {
                    report.recovery_sent = self.recover(&report.check, previous_down_count).await;
                }
            }
        }

        report.incident_id.clone_from(&self.state.open_incident_id);
        self.persist();
        report
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.state) {
                error!(error = %e, "Failed to persist escalation state");
            }
        }
    }

    async fn alert(&self, check: &CheckResult, down_count: u32) -> bool {
        self.notifier
            .notify(&NotifyEvent::SiteDown {
                url: self.url.clone(),
                error: check.error().to_string(),
                down_count,
                threshold: self.threshold,
                timestamp: Utc::now(),
            })
            .await
    }

    /// Open an incident for this streak, or escalate the one already open.
    async fn report_incident(&mut self, check: &CheckResult, severity: IncidentSeverity) {
        let Some(client) = &self.incidents else {
            return;
        };

        match self.state.open_incident_id.clone() {
            None => {
                let incident = NewIncident::open(
                    MONITOR_ID,
                    format!("Website Downtime: {}", self.url),
                    format!("Website {} is down. Error: {}", self.url, check.error()),
                    severity,
                );
                match client.create_incident(&incident).await {
                    Ok(created) => {
                        let id = created.key().map(str::to_string);
                        debug!(incident_id = ?id, severity = ?severity, "Tracking incident for this streak");
                        self.state.open_incident_id = id;
                    }
                    Err(e) => warn!(error = %e, "Failed to create incident"),
                }
            }
            Some(id) => {
                let update = IncidentUpdate {
                    status: Some(IncidentStatus::Investigating),
                    severity: Some(severity),
                    resolution: None,
                };
                if let Err(e) = client.update_incident(&id, &update).await {
                    warn!(incident_id = %id, error = %e, "Failed to update incident");
                } else {
                    debug!(incident_id = %id, severity = ?severity, "Incident updated");
                }
            }
        }
    }

    async fn remediate(&self, check: &CheckResult) -> RemediationOutcome {
        let outcome = self.try_remediate(check).await;

        match &outcome {
            RemediationOutcome::Opened(pr) => {
                info!(pr_number = pr.number, pr_url = %pr.url, branch = %pr.branch, "Fix pull request opened");
            }
            RemediationOutcome::Skipped(reason) => info!(reason = %reason, "Remediation skipped"),
            RemediationOutcome::AlreadyRunning => warn!("Remediation already running elsewhere"),
            RemediationOutcome::NotDiagnosed(reason) | RemediationOutcome::Failed(reason) => {
                error!(reason = %reason, "Automatic fix failed");
                self.notifier
                    .notify(&NotifyEvent::RemediationFailed {
                        url: self.url.clone(),
                        reason: reason.clone(),
                        timestamp: Utc::now(),
                    })
                    .await;
            }
        }

        self.report_fix_outcome(check, &outcome).await;
        outcome
    }

    async fn try_remediate(&self, check: &CheckResult) -> RemediationOutcome {
        let Some(diagnoser) = &self.diagnoser else {
            return RemediationOutcome::Skipped("AI diagnosis not configured".to_string());
        };
        if !diagnoser.is_configured() {
            return RemediationOutcome::Skipped(format!("{} provider has no API key", diagnoser.provider_name()));
        }
        let Some(remediator) = &self.remediator else {
            return RemediationOutcome::Skipped("GitHub integration not configured".to_string());
        };

        info!(url = %self.url, "Analyzing downtime");
        let diagnosis = match diagnoser.diagnose(&self.url, check.error()).await {
            DiagnosisOutcome::Ready(d) if d.has_fixes() => d,
            DiagnosisOutcome::Ready(_) => {
                return RemediationOutcome::NotDiagnosed("diagnosis proposed no fixes".to_string());
            }
            other => return RemediationOutcome::NotDiagnosed(other.describe()),
        };

        let downtime = DowntimeContext {
            url: self.url.clone(),
            error_detail: check.error().to_string(),
            down_count: self.state.escalation.consecutive_down_count,
        };

        match remediator.remediate(&diagnosis, &downtime).await {
            Ok(pr) => {
                self.notifier
                    .notify(&NotifyEvent::RemediationOpened {
                        url: self.url.clone(),
                        error: downtime.error_detail.clone(),
                        priority: diagnosis.priority.to_string(),
                        root_cause: diagnosis.root_cause.clone(),
                        files_modified: diagnosis.fixes.len(),
                        pr_number: pr.number,
                        pr_url: pr.url.clone(),
                        branch: pr.branch.clone(),
                        timestamp: Utc::now(),
                    })
                    .await;
                RemediationOutcome::Opened(pr)
            }
            Err(RemediationError::AlreadyRunning { .. }) => RemediationOutcome::AlreadyRunning,
            Err(e) => RemediationOutcome::Failed(e.to_string()),
        }
    }

    async fn report_fix_outcome(&self, check: &CheckResult, outcome: &RemediationOutcome) {
        let Some(client) = &self.incidents else {
            return;
        };

        let (status, detail) = match outcome {
            RemediationOutcome::Opened(pr) => (
                "fix_opened",
                json!({"pr_number": pr.number, "pr_url": pr.url, "branch": pr.branch}),
            ),
            RemediationOutcome::Skipped(reason) => ("skipped", json!({"reason": reason})),
            RemediationOutcome::NotDiagnosed(reason) => ("not_diagnosed", json!({"reason": reason})),
            RemediationOutcome::AlreadyRunning => ("already_running", json!({})),
            RemediationOutcome::Failed(reason) => ("failed", json!({"reason": reason})),
        };

        let incident = json!({
            "status": "DOWN",
            "error": check.error(),
            "down_count": self.state.escalation.consecutive_down_count,
            "incident_id": self.state.open_incident_id,
            "remediation": {"status": status, "detail": detail},
        });
        if let Err(e) = client.report_incident(&self.url, &incident).await {
            warn!(error = %e, "Failed to report fix outcome");
        }
    }

    async fn recover(&mut self, check: &CheckResult, previous_down_count: u32) -> bool {
        info!(url = %self.url, previous_down_count, "Site recovered");

        let sent = self
            .notifier
            .notify(&NotifyEvent::SiteRecovered {
                url: self.url.clone(),
                latency_secs: check.latency_secs(),
                timestamp: Utc::now(),
            })
            .await;

        if let (Some(client), Some(id)) = (&self.incidents, self.state.open_incident_id.clone()) {
            let update = IncidentUpdate::resolved(format!(
                "Site answered again after {previous_down_count} failed check(s)"
            ));
            match client.update_incident(&id, &update).await {
                Ok(_) => info!(incident_id = %id, "Incident resolved"),
                Err(e) => warn!(incident_id = %id, error = %e, "Failed to resolve incident"),
            }
        }
        // A new streak opens a new incident even if resolution failed.
        self.state.open_incident_id = None;

        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeConfig;
    use async_trait::async_trait;
    use notify::{ChannelError, NotifyChannel};
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotifyChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            "recording"
        }
        fn enabled(&self) -> bool {
            true
        }
        async fn send(&self, text: &str) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn prober() -> Prober {
        Prober::new(ProbeConfig {
            max_attempts: 1,
            timeout: Duration::from_secs(2),
            retry_delay: Duration::ZERO,
        })
        .unwrap()
    }

    async fn site(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_down_alerts_without_diagnoser() {
        let server = site(503).await;
        let channel = Arc::new(RecordingChannel::default());
        let mut driver = Driver::new(server.uri(), 1, prober(), Notifier::with_channels(vec![channel.clone()]));

        let report = driver.run_cycle().await;

        assert_eq!(report.state.consecutive_down_count, 1);
        assert_eq!(report.alerts_sent, 1);
        assert_eq!(
            report.remediation,
            Some(RemediationOutcome::Skipped("AI diagnosis not configured".to_string()))
        );
        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_up_when_healthy_sends_nothing() {
        let server = site(200).await;
        let channel = Arc::new(RecordingChannel::default());
        let mut driver = Driver::new(server.uri(), 2, prober(), Notifier::with_channels(vec![channel.clone()]));

        let report = driver.run_cycle().await;

        assert!(report.check.is_up());
        assert!(report.actions.is_empty());
        assert_eq!(report.alerts_sent, 0);
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_block_cycle() {
        let server = site(500).await;
        let mut driver = Driver::new(server.uri(), 5, prober(), Notifier::disabled());

        let report = driver.run_cycle().await;

        assert_eq!(report.state.consecutive_down_count, 1);
        assert_eq!(report.alerts_sent, 0);
        assert!(report.remediation.is_none());
    }
}
