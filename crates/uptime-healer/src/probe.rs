//! Reachability probe for the monitored URL.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Error detail when attempts failed for different reasons.
pub const ALL_ATTEMPTS_FAILED: &str = "All retry attempts failed";

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Up,
    Down,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
        }
    }
}

/// Result of one probe cycle. Produced fresh every cycle and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub verdict: Verdict,
    pub http_status: Option<u16>,
    pub latency: Option<Duration>,
    pub error_detail: Option<String>,
}

impl CheckResult {
    /// A healthy response.
    #[must_use]
    pub fn up(http_status: u16, latency: Duration) -> Self {
        Self {
            verdict: Verdict::Up,
            http_status: Some(http_status),
            latency: Some(latency),
            error_detail: None,
        }
    }

    /// A failed check.
    #[must_use]
    pub fn down(http_status: Option<u16>, error_detail: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Down,
            http_status,
            latency: None,
            error_detail: Some(error_detail.into()),
        }
    }

    #[must_use]
    pub fn is_up(&self) -> bool {
        self.verdict == Verdict::Up
    }

    /// Error detail, or `"Unknown"` when none was recorded.
    #[must_use]
    pub fn error(&self) -> &str {
        self.error_detail.as_deref().unwrap_or("Unknown")
    }

    #[must_use]
    pub fn latency_secs(&self) -> Option<f64> {
        self.latency.map(|d| d.as_secs_f64())
    }
}

/// Probe policy.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Attempts per check, including the first (default: 3).
    pub max_attempts: u32,
    /// Per-request timeout (default: 10 seconds).
    pub timeout: Duration,
    /// Pause between attempts after a transport failure.
    pub retry_delay: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Performs bounded-retry HTTP GET checks.
///
/// Only exactly HTTP 200 counts as up. Any other status is a definitive
/// answer from the server and is returned immediately; only transport
/// failures (timeouts, refused connections) are retried.
#[derive(Debug, Clone)]
pub struct Prober {
    client: reqwest::Client,
    config: ProbeConfig,
}

impl Prober {
    /// Create a prober.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ProbeConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("uptime-healer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Check `url` once, retrying transport failures up to `max_attempts`.
    pub async fn check(&self, url: &str) -> CheckResult {
        let max_attempts = self.config.max_attempts.max(1);
        let mut failures: Vec<String> = Vec::with_capacity(max_attempts as usize);

        for attempt in 1..=max_attempts {
            debug!(url, attempt, max_attempts, "Checking uptime");
            let started = Instant::now();

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let latency = started.elapsed();
                    return if status == 200 {
                        debug!(url, latency_ms = latency.as_millis() as u64, "Site is up");
                        CheckResult::up(status, latency)
                    } else {
                        warn!(url, status, "Site answered with non-200 status");
                        CheckResult::down(Some(status), format!("HTTP {status}"))
                    };
                }
                Err(e) => {
                    let label = classify(&e);
                    warn!(url, attempt, max_attempts, error = %e, label = %label, "Probe attempt failed");
                    failures.push(label);
                }
            }

            if attempt < max_attempts && !self.config.retry_delay.is_zero() {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        CheckResult::down(None, summarize_failures(&failures))
    }
}

/// Label for a transport failure.
fn classify(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Timeout".to_string()
    } else if error.is_connect() {
        "Connection Error".to_string()
    } else {
        error.to_string()
    }
}

/// Collapse per-attempt failure labels into one error detail.
///
/// When every attempt failed the same way, that label is kept; otherwise the
/// generic [`ALL_ATTEMPTS_FAILED`] is used.
fn summarize_failures(failures: &[String]) -> String {
    match failures.split_first() {
        Some((first, rest)) if rest.iter().all(|f| f == first) => first.clone(),
        _ => ALL_ATTEMPTS_FAILED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prober(max_attempts: u32, timeout: Duration) -> Prober {
        Prober::new(ProbeConfig {
            max_attempts,
            timeout,
            retry_delay: Duration::ZERO,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_status_200_is_up_with_latency() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let result = prober(3, Duration::from_secs(5)).check(&server.uri()).await;

        assert_eq!(result.verdict, Verdict::Up);
        assert_eq!(result.http_status, Some(200));
        assert!(result.latency.is_some());
        assert!(result.error_detail.is_none());
    }

    #[tokio::test]
    async fn test_non_200_is_down_without_retry() {
        for status in [201_u16, 404, 500, 503] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(status))
                .expect(1)
                .mount(&server)
                .await;

            let result = prober(3, Duration::from_secs(5)).check(&server.uri()).await;

            assert_eq!(result.verdict, Verdict::Down);
            assert_eq!(result.http_status, Some(status));
            assert_eq!(result.error_detail, Some(format!("HTTP {status}")));
            server.verify().await;
        }
    }

    #[tokio::test]
    async fn test_timeout_is_retried_then_labelled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(2)
            .mount(&server)
            .await;

        let result = prober(2, Duration::from_millis(50)).check(&server.uri()).await;

        assert_eq!(result.verdict, Verdict::Down);
        assert_eq!(result.error(), "Timeout");
        assert!(result.http_status.is_none());
    }

    #[tokio::test]
    async fn test_refused_connection_is_labelled() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = prober(2, Duration::from_secs(2))
            .check(&format!("http://{addr}/"))
            .await;

        assert_eq!(result.verdict, Verdict::Down);
        assert_eq!(result.error(), "Connection Error");
    }

    #[test]
    fn test_mixed_failures_use_generic_detail() {
        let mixed = vec!["Timeout".to_string(), "Connection Error".to_string()];
        assert_eq!(summarize_failures(&mixed), ALL_ATTEMPTS_FAILED);
        assert_eq!(summarize_failures(&[]), ALL_ATTEMPTS_FAILED);

        let same = vec!["Timeout".to_string(), "Timeout".to_string()];
        assert_eq!(summarize_failures(&same), "Timeout");
    }
}
