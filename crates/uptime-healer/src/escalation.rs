//! Downtime escalation state machine.
//!
//! The tracker is a pure function from (state, check result) to (next state,
//! actions). It performs no I/O; the driver executes the returned actions.
//!
//! ```text
//!   DOWN: count += 1 ─┬─ always            → Alert, ReportIncident
//!                     └─ count == threshold → Remediate   (once per episode)
//!   UP:   count > 0   ─── reset to 0        → Recover
//!         count == 0  ─── no-op
//! ```

use incidents::IncidentSeverity;
use serde::{Deserialize, Serialize};

use crate::probe::{CheckResult, Verdict};

/// Consecutive-failure state carried between cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationState {
    pub consecutive_down_count: u32,
    /// `None` until the first check has been observed.
    pub last_verdict: Option<Verdict>,
}

impl EscalationState {
    /// Whether the current DOWN streak has reached the remediation threshold.
    #[must_use]
    pub fn is_escalated(&self, threshold: u32) -> bool {
        self.consecutive_down_count >= threshold.max(1)
    }
}

/// Side effects decided by one transition, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Send the immediate downtime alert.
    Alert { down_count: u32 },
    /// Open (or escalate) the incident for this streak.
    ReportIncident { severity: IncidentSeverity },
    /// Run diagnosis and remediation. Emitted only on the threshold crossing.
    Remediate,
    /// Send the recovery notice and resolve the incident.
    Recover { previous_down_count: u32 },
}

/// Next state plus the actions to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: EscalationState,
    pub actions: Vec<Action>,
}

impl Transition {
    #[must_use]
    pub fn triggers_remediation(&self) -> bool {
        self.actions.contains(&Action::Remediate)
    }
}

/// Apply one check result to the escalation state.
///
/// A `threshold` of zero is treated as one.
#[must_use]
pub fn transition(state: &EscalationState, result: &CheckResult, threshold: u32) -> Transition {
    let threshold = threshold.max(1);

    match result.verdict {
        Verdict::Down => {
            let count = state.consecutive_down_count.saturating_add(1);
            let severity = if count >= threshold {
                IncidentSeverity::High
            } else {
                IncidentSeverity::Medium
            };

            let mut actions = vec![
                Action::Alert { down_count: count },
                Action::ReportIncident { severity },
            ];
            if count == threshold {
                actions.push(Action::Remediate);
            }

            Transition {
                state: EscalationState {
                    consecutive_down_count: count,
                    last_verdict: Some(Verdict::Down),
                },
                actions,
            }
        }
        Verdict::Up => {
            let actions = if state.consecutive_down_count > 0 {
                vec![Action::Recover {
                    previous_down_count: state.consecutive_down_count,
                }]
            } else {
                vec![]
            };

            Transition {
                state: EscalationState {
                    consecutive_down_count: 0,
                    last_verdict: Some(Verdict::Up),
                },
                actions,
            }
        }
    }
}
