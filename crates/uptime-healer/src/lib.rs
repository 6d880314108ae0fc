//! Uptime monitor that escalates sustained downtime into fix pull requests.
//!
//! Each cycle probes one URL and feeds the verdict through a pure escalation
//! state machine. Every failed check sends a chat alert and opens or escalates
//! an incident. When consecutive failures reach the threshold, the failure is
//! handed to an LLM for diagnosis and the proposed file changes are pushed as
//! a branch and pull request. The first healthy check afterwards sends a
//! recovery notice and resolves the incident.
//!
//! ```text
//!  Prober ──▶ transition() ──▶ Notifier
//!                  │      ├──▶ IncidentClient
//!                  │      └──▶ Diagnoser ──▶ Remediator ──▶ Notifier
//!                  ▼
//!             StateStore
//! ```

#![warn(clippy::pedantic)]

pub mod ai;
pub mod config;
pub mod diagnose;
pub mod driver;
pub mod escalation;
pub mod probe;
pub mod remediate;
pub mod state;

pub use config::{ConfigError, MonitorArgs, Settings};
pub use diagnose::{Diagnoser, Diagnosis, DiagnosisOutcome, Fix, Priority};
pub use driver::{CycleReport, Driver, RemediationOutcome};
pub use escalation::{transition, Action, EscalationState, Transition};
pub use probe::{CheckResult, ProbeConfig, Prober, Verdict};
pub use remediate::{
    DowntimeContext, GitRemediator, PullRequestRef, RemediationConfig, RemediationError, Remediator,
};
pub use state::{PersistedState, StateStore};
