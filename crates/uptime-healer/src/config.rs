//! Monitor settings.
//!
//! Values come from CLI flags with environment fallbacks (a `.env` file is
//! loaded by the binary before parsing). Collaborator credentials are read
//! separately by each collaborator's `from_env()`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::probe::ProbeConfig;

/// Invalid or incomplete configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MONITORED_URL is required (pass --url or set it in the environment)")]
    MissingUrl,

    #[error("Invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("{present} is set but {missing} is missing")]
    Incomplete {
        present: &'static str,
        missing: &'static str,
    },
}

/// Driver settings shared by every subcommand.
#[derive(Debug, Clone, clap::Args)]
pub struct MonitorArgs {
    /// URL to monitor
    #[arg(long, env = "MONITORED_URL", global = true)]
    pub url: Option<String>,

    /// Probe attempts per check
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 3, global = true)]
    pub retry_attempts: u32,

    /// Per-request probe timeout in seconds
    #[arg(long, env = "PROBE_TIMEOUT_SECS", default_value_t = 10, global = true)]
    pub probe_timeout_secs: u64,

    /// Delay between probe attempts in milliseconds
    #[arg(long, env = "PROBE_RETRY_DELAY_MS", default_value_t = 1000, global = true)]
    pub probe_retry_delay_ms: u64,

    /// Consecutive DOWN checks before remediation
    #[arg(long, env = "DOWN_THRESHOLD", default_value_t = 2, global = true)]
    pub down_threshold: u32,

    /// Minutes between checks in watch mode
    #[arg(long, env = "MONITORING_INTERVAL", default_value_t = 5, global = true)]
    pub interval_minutes: u64,

    /// Escalation state file
    #[arg(
        long,
        env = "HEALER_STATE_FILE",
        default_value = ".uptime-healer/state.json",
        global = true
    )]
    pub state_file: PathBuf,

    /// Root directory for remediation checkouts (default: system temp dir)
    #[arg(long, env = "HEALER_WORK_DIR", global = true)]
    pub work_dir: Option<PathBuf>,
}

/// Validated settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub url: String,
    pub probe: ProbeConfig,
    pub down_threshold: u32,
    pub interval: Duration,
    pub state_file: PathBuf,
    pub work_root: PathBuf,
}

impl Settings {
    /// Validate CLI/env values.
    pub fn from_args(args: &MonitorArgs) -> Result<Self, ConfigError> {
        let url = args
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingUrl)?;
        let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::Invalid {
            key: "MONITORED_URL",
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                key: "MONITORED_URL",
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        if args.down_threshold == 0 {
            return Err(ConfigError::Invalid {
                key: "DOWN_THRESHOLD",
                reason: "must be at least 1".to_string(),
            });
        }
        if args.retry_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "RETRY_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }
        if args.probe_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "PROBE_TIMEOUT_SECS",
                reason: "must be at least 1".to_string(),
            });
        }
        if args.interval_minutes == 0 {
            return Err(ConfigError::Invalid {
                key: "MONITORING_INTERVAL",
                reason: "must be at least 1 minute".to_string(),
            });
        }

        Ok(Self {
            url: url.to_string(),
            probe: ProbeConfig {
                max_attempts: args.retry_attempts,
                timeout: Duration::from_secs(args.probe_timeout_secs),
                retry_delay: Duration::from_millis(args.probe_retry_delay_ms),
            },
            down_threshold: args.down_threshold,
            interval: Duration::from_secs(args.interval_minutes.saturating_mul(60)),
            state_file: args.state_file.clone(),
            work_root: args
                .work_dir
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("uptime-healer")),
        })
    }
}

/// Read a non-empty environment variable.
pub(crate) fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(url: Option<&str>) -> MonitorArgs {
        MonitorArgs {
            url: url.map(str::to_string),
            retry_attempts: 3,
            probe_timeout_secs: 10,
            probe_retry_delay_ms: 1000,
            down_threshold: 2,
            interval_minutes: 5,
            state_file: PathBuf::from(".uptime-healer/state.json"),
            work_dir: None,
        }
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_args(&args(Some("https://example.com"))).unwrap();
        assert_eq!(settings.down_threshold, 2);
        assert_eq!(settings.interval, Duration::from_secs(300));
        assert_eq!(settings.probe.max_attempts, 3);
        assert_eq!(settings.probe.retry_delay, Duration::from_secs(1));
        assert!(settings.work_root.ends_with("uptime-healer"));
    }

    #[test]
    fn test_url_required_and_validated() {
        assert!(matches!(Settings::from_args(&args(None)), Err(ConfigError::MissingUrl)));
        assert!(matches!(Settings::from_args(&args(Some("  "))), Err(ConfigError::MissingUrl)));
        assert!(matches!(
            Settings::from_args(&args(Some("not a url"))),
            Err(ConfigError::Invalid { key: "MONITORED_URL", .. })
        ));
        assert!(matches!(
            Settings::from_args(&args(Some("ftp://example.com"))),
            Err(ConfigError::Invalid { key: "MONITORED_URL", .. })
        ));
    }

    #[test]
    fn test_threshold_must_be_positive() {
        let mut a = args(Some("https://example.com"));
        a.down_threshold = 0;
        let err = Settings::from_args(&a).unwrap_err();
        assert_eq!(err.to_string(), "Invalid DOWN_THRESHOLD: must be at least 1");
    }
}
