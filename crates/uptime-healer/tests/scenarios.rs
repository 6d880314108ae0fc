//! End-to-end monitoring scenarios against mock collaborators.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use incidents::{IncidentClient, IncidentConfig};
use notify::{ChannelError, Notifier, NotifyChannel};
use serde_json::json;
use uptime_healer::ai::{
    AIMessage, AIProvider, AIResponse, GeminiProvider, GenerateOptions, ProviderError, TokenUsage,
};
use uptime_healer::{
    Action, Diagnoser, Diagnosis, DowntimeContext, Driver, GitRemediator, ProbeConfig, Prober,
    PullRequestRef, RemediationConfig, RemediationError, RemediationOutcome, Remediator, StateStore,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Fakes
// =============================================================================

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<String>>,
}

impl RecordingChannel {
    fn count(&self, title: &str) -> usize {
        self.sent.lock().unwrap().iter().filter(|m| m.contains(title)).count()
    }
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

struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| (*r).to_string()).collect()),
        })
    }
}

#[async_trait]
impl AIProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }
    fn api_key_env_var(&self) -> &'static str {
        "SCRIPTED_KEY"
    }
    fn is_configured(&self) -> bool {
        true
    }
    fn model(&self) -> &str {
        "scripted-1"
    }
    async fn generate_text(
        &self,
        _messages: &[AIMessage],
        _options: &GenerateOptions,
    ) -> Result<AIResponse, ProviderError> {
        let text = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ProviderError::EmptyResponse("scripted"))?;
        Ok(AIResponse {
            text,
            usage: TokenUsage::default(),
            model: "scripted-1".to_string(),
            provider: "scripted".to_string(),
        })
    }
}

#[derive(Default)]
struct CountingRemediator {
    calls: AtomicUsize,
}

#[async_trait]
impl Remediator for CountingRemediator {
    async fn remediate(
        &self,
        diagnosis: &Diagnosis,
        _downtime: &DowntimeContext,
    ) -> Result<PullRequestRef, RemediationError> {
        assert!(diagnosis.has_fixes());
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PullRequestRef {
            number: n as u64,
            url: format!("https://github.com/acme/site/pull/{n}"),
            branch: "fix/website-downtime-1".to_string(),
        })
    }
}

const ANALYSIS: &str = r#"{"root_cause": "Worker pool exhausted", "fixes": [{"file": "config/app.yaml", "changes": "raise pool size"}], "priority": "HIGH"}"#;

// =============================================================================
// Helpers
// =============================================================================

fn prober() -> Prober {
    Prober::new(ProbeConfig {
        max_attempts: 1,
        timeout: Duration::from_secs(2),
        retry_delay: Duration::ZERO,
    })
    .unwrap()
}

fn notifier(channel: &Arc<RecordingChannel>) -> Notifier {
    Notifier::with_channels(vec![channel.clone() as Arc<dyn NotifyChannel>])
}

/// Point the mock site at a single status for the next cycle.
async fn serve(site: &MockServer, status: u16) {
    site.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status))
        .mount(site)
        .await;
}

fn has_workspace(work_root: &Path) -> bool {
    std::fs::read_dir(work_root).is_ok_and(|mut entries| entries.next().is_some())
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn scenario_a_two_downs_trigger_one_remediation() {
    let site = MockServer::start().await;
    let channel = Arc::new(RecordingChannel::default());
    let remediator = Arc::new(CountingRemediator::default());
    let provider = ScriptedProvider::new(&[ANALYSIS, "pool_size: 64\n"]);

    let mut driver = Driver::new(site.uri(), 2, prober(), notifier(&channel))
        .with_diagnoser(Diagnoser::new(provider))
        .with_remediator(remediator.clone());

    serve(&site, 503).await;
    let first = driver.run_cycle().await;
    assert!(first.remediation.is_none());

    serve(&site, 503).await;
    let second = driver.run_cycle().await;

    assert_eq!(second.state.consecutive_down_count, 2);
    assert!(second.actions.contains(&Action::Remediate));
    assert!(matches!(second.remediation, Some(RemediationOutcome::Opened(ref pr)) if pr.number == 1));
    assert_eq!(remediator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(channel.count("UPTIME ALERT"), 2);
    assert_eq!(channel.count("AUTO-FIX OPENED"), 1);

    // Still down: no second episode.
    serve(&site, 503).await;
    let third = driver.run_cycle().await;
    assert!(third.remediation.is_none());
    assert_eq!(remediator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scenario_b_down_then_up_recovers_without_remediation() {
    let site = MockServer::start().await;
    let channel = Arc::new(RecordingChannel::default());
    let remediator = Arc::new(CountingRemediator::default());

    let mut driver = Driver::new(site.uri(), 2, prober(), notifier(&channel))
        .with_diagnoser(Diagnoser::new(ScriptedProvider::new(&[])))
        .with_remediator(remediator.clone());

    serve(&site, 500).await;
    driver.run_cycle().await;

    serve(&site, 200).await;
    let report = driver.run_cycle().await;

    assert_eq!(report.state.consecutive_down_count, 0);
    assert!(report.recovery_sent);
    assert_eq!(channel.count("UPTIME ALERT"), 1);
    assert_eq!(channel.count("WEBSITE RECOVERED"), 1);
    assert_eq!(remediator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scenario_c_no_diagnosis_never_reaches_remediator() {
    let site = MockServer::start().await;
    let channel = Arc::new(RecordingChannel::default());
    let tmp = tempfile::tempdir().unwrap();
    let work_root = tmp.path().join("work");

    let mut config = RemediationConfig::new("ghp_test", "acme", "site", &work_root);
    config.api_url = "http://127.0.0.1:9".to_string();
    config.clone_url = Some(tmp.path().join("origin.git").to_string_lossy().into_owned());
    let remediator = Arc::new(GitRemediator::new(config).unwrap());

    let provider = ScriptedProvider::new(&["I could not determine anything useful."]);
    let mut driver = Driver::new(site.uri(), 1, prober(), notifier(&channel))
        .with_diagnoser(Diagnoser::new(provider))
        .with_remediator(remediator);

    serve(&site, 502).await;
    let report = driver.run_cycle().await;

    assert!(matches!(report.remediation, Some(RemediationOutcome::NotDiagnosed(_))));
    assert!(!has_workspace(&work_root));
    assert_eq!(channel.count("AUTO-FIX FAILED"), 1);
}

#[tokio::test]
async fn unreachable_ai_endpoint_never_leaks_the_api_key() {
    let site = MockServer::start().await;
    let channel = Arc::new(RecordingChannel::default());
    let remediator = Arc::new(CountingRemediator::default());

    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);
    let provider = GeminiProvider::new("AIzaSECRETKEY123").with_base_url(format!("http://{addr}"));

    let mut driver = Driver::new(site.uri(), 1, prober(), notifier(&channel))
        .with_diagnoser(Diagnoser::new(Arc::new(provider)))
        .with_remediator(remediator.clone());

    serve(&site, 500).await;
    let report = driver.run_cycle().await;

    match report.remediation {
        Some(RemediationOutcome::NotDiagnosed(ref reason)) => {
            assert!(!reason.contains("AIzaSECRETKEY123"), "{reason}");
        }
        ref other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(channel.count("AUTO-FIX FAILED"), 1);
    assert_eq!(channel.count("AIzaSECRETKEY123"), 0);
    assert_eq!(remediator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn diagnosis_without_fixes_is_a_hard_stop() {
    let site = MockServer::start().await;
    let channel = Arc::new(RecordingChannel::default());
    let remediator = Arc::new(CountingRemediator::default());
    let provider = ScriptedProvider::new(&[
        r#"{"root_cause": "Unable to determine root cause", "fixes": [], "priority": "UNKNOWN"}"#,
    ]);

    let mut driver = Driver::new(site.uri(), 1, prober(), notifier(&channel))
        .with_diagnoser(Diagnoser::new(provider))
        .with_remediator(remediator.clone());

    serve(&site, 500).await;
    let report = driver.run_cycle().await;

    assert!(matches!(report.remediation, Some(RemediationOutcome::NotDiagnosed(_))));
    assert_eq!(remediator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn state_survives_fresh_driver_instances() {
    let site = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let state_file = tmp.path().join("state.json");
    let remediator = Arc::new(CountingRemediator::default());

    serve(&site, 503).await;
    for expected in 1..=3_u32 {
        let channel = Arc::new(RecordingChannel::default());
        let provider = ScriptedProvider::new(&[ANALYSIS, "pool_size: 64\n"]);
        let mut driver = Driver::new(site.uri(), 2, prober(), notifier(&channel))
            .with_state_store(StateStore::new(&state_file))
            .with_diagnoser(Diagnoser::new(provider))
            .with_remediator(remediator.clone());

        let report = driver.run_cycle().await;
        assert_eq!(report.state.consecutive_down_count, expected);
    }

    assert_eq!(remediator.calls.load(Ordering::SeqCst), 1);

    serve(&site, 200).await;
    let mut driver = Driver::new(site.uri(), 2, prober(), Notifier::disabled())
        .with_state_store(StateStore::new(&state_file));
    let report = driver.run_cycle().await;
    assert!(report.actions.contains(&Action::Recover { previous_down_count: 3 }));
    assert_eq!(StateStore::new(&state_file).load().escalation.consecutive_down_count, 0);
}

#[tokio::test]
async fn incident_lifecycle_follows_the_streak() {
    let site = MockServer::start().await;
    let api = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/incidents/create"))
        .and(body_partial_json(json!({"severity": "medium", "status": "open"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"incident_id": "inc-1"})))
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/incidents/update"))
        .and(body_partial_json(json!({"incident_id": "inc-1", "severity": "high"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/incidents/update"))
        .and(body_partial_json(json!({"incident_id": "inc-1", "status": "resolved"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/incidents/report"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&api)
        .await;

    let incidents = IncidentClient::new(IncidentConfig::new(api.uri(), Some("pk_test".to_string()))).unwrap();
    let mut driver = Driver::new(site.uri(), 2, prober(), Notifier::disabled()).with_incidents(incidents);

    serve(&site, 503).await;
    let first = driver.run_cycle().await;
    assert_eq!(first.incident_id.as_deref(), Some("inc-1"));

    serve(&site, 503).await;
    let second = driver.run_cycle().await;
    assert!(matches!(second.remediation, Some(RemediationOutcome::Skipped(_))));

    serve(&site, 200).await;
    let third = driver.run_cycle().await;
    assert!(third.incident_id.is_none());

    api.verify().await;
}
