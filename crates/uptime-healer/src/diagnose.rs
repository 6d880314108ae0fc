//! AI diagnosis of a downtime event.
//!
//! One analysis call returns a JSON object describing the root cause and
//! per-file fixes; one more call per fix produces the complete file content.
//! The model output is extracted leniently (first `{` to last `}`) and then
//! validated against the expected shape, so "the model said nothing usable"
//! and "the model said something broken" stay distinguishable.

use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ai::{AIMessage, AIProvider, GenerateOptions, ProviderError};

const ANALYSIS_SYSTEM: &str = "You are an expert DevOps engineer and website reliability specialist. \
You answer with a single JSON object and nothing else.";

const FIX_SYSTEM: &str = "You are an expert software developer. \
You answer with the complete file content only, without explanations or markdown formatting.";

/// Urgency assigned by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
    Unknown,
}

impl Priority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(format!("invalid priority '{other}'")),
        }
    }
}

/// One file-level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    /// Path relative to the repository root.
    pub file_path: String,
    pub change_description: String,
    /// Complete new file content.
    pub generated_content: String,
}

/// Validated model diagnosis, consumed once by the remediator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub root_cause: String,
    pub fixes: Vec<Fix>,
    pub config_changes: Vec<String>,
    pub priority: Priority,
    pub estimated_time: String,
}

impl Diagnosis {
    #[must_use]
    pub fn has_fixes(&self) -> bool {
        !self.fixes.is_empty()
    }
}

/// Result of one diagnosis attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosisOutcome {
    Ready(Diagnosis),
    /// The model response contained no JSON object.
    NoDiagnosis,
    /// A JSON object was found but is unparseable or violates the schema.
    Malformed(String),
    /// The provider call itself failed.
    Failed(String),
}

impl DiagnosisOutcome {
    /// Short label for logs and notifications.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Ready(d) => format!("diagnosis with {} fix(es)", d.fixes.len()),
            Self::NoDiagnosis => "no diagnosis in AI response".to_string(),
            Self::Malformed(reason) => format!("malformed diagnosis: {reason}"),
            Self::Failed(reason) => format!("AI analysis failed: {reason}"),
        }
    }
}

/// Errors turning model output into a [`Diagnosis`].
#[derive(Debug, Error)]
pub enum DiagnoseError {
    #[error("no JSON object in response")]
    NoJson,

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("{0}")]
    Schema(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl From<DiagnoseError> for DiagnosisOutcome {
    fn from(err: DiagnoseError) -> Self {
        match err {
            DiagnoseError::NoJson => Self::NoDiagnosis,
            e @ (DiagnoseError::InvalidJson(_) | DiagnoseError::Schema(_)) => {
                Self::Malformed(e.to_string())
            }
            DiagnoseError::Provider(e) => Self::Failed(e.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFix {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    changes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDiagnosis {
    #[serde(default)]
    root_cause: Option<String>,
    #[serde(default)]
    fixes: Vec<RawFix>,
    #[serde(default)]
    config_changes: Vec<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    estimated_time: Option<String>,
}

/// A validated diagnosis whose fixes still lack generated content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub root_cause: String,
    /// `(file_path, change_description)` pairs.
    pub fixes: Vec<(String, String)>,
    pub config_changes: Vec<String>,
    pub priority: Priority,
    pub estimated_time: String,
}

/// Slice from the first `{` to the last `}` inclusive.
///
/// Returns `None` when there is no `{`, or no `}` after it.
#[must_use]
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Extract and validate the analysis object from a model response.
pub fn parse_analysis(text: &str) -> Result<Analysis, DiagnoseError> {
    let json = extract_json(text).ok_or(DiagnoseError::NoJson)?;
    let raw: RawDiagnosis = serde_json::from_str(json)?;

    let root_cause = raw
        .root_cause
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DiagnoseError::Schema("missing root_cause".to_string()))?;

    let priority = match raw.priority.as_deref() {
        None => Priority::Unknown,
        Some(p) => p.parse().map_err(DiagnoseError::Schema)?,
    };

    let fixes = raw
        .fixes
        .into_iter()
        .enumerate()
        .map(|(i, fix)| {
            let file = fix
                .file
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .ok_or_else(|| DiagnoseError::Schema(format!("fix {i} has no file")))?;
            validate_relative_path(&file)
                .map_err(|reason| DiagnoseError::Schema(format!("fix {i}: {reason}")))?;
            let changes = fix
                .changes
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| DiagnoseError::Schema(format!("fix {i} has no changes")))?;
            Ok((file, changes))
        })
        .collect::<Result<Vec<_>, DiagnoseError>>()?;

    Ok(Analysis {
        root_cause,
        fixes,
        config_changes: raw.config_changes,
        priority,
        estimated_time: raw
            .estimated_time
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
    })
}

/// Reject absolute paths and parent-directory components.
fn validate_relative_path(file: &str) -> Result<(), String> {
    let path = Path::new(file);
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => return Err(format!("path '{file}' escapes the repository")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("path '{file}' is absolute"));
            }
        }
    }
    if path.components().all(|c| c == Component::CurDir) {
        return Err(format!("path '{file}' names no file"));
    }
    Ok(())
}

/// Remove a surrounding markdown code fence from generated file content.
#[must_use]
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let lines: Vec<&str> = trimmed.lines().collect();
    if lines.len() <= 2 {
        return trimmed.to_string();
    }

    let end = if lines[lines.len() - 1].trim_start().starts_with("```") {
        lines.len() - 1
    } else {
        lines.len()
    };
    lines[1..end].join("\n")
}

fn analysis_prompt(url: &str, error_detail: &str) -> String {
    format!(
        r#"A website monitoring system detected that {url} is down.

Error details: {error_detail}

Analyze the issue and respond with ONLY a JSON object in exactly this format:
{{
  "root_cause": "detailed description of the root cause",
  "fixes": [
    {{
      "file": "path/relative/to/repository/root.ext",
      "changes": "description of what needs to be changed"
    }}
  ],
  "config_changes": ["configuration changes needed"],
  "priority": "HIGH | MEDIUM | LOW",
  "estimated_time": "estimated time to fix"
}}

Be specific and actionable. If the cause cannot be determined, return a
root_cause explaining that, an empty "fixes" list and priority "UNKNOWN"."#
    )
}

fn fix_prompt(file: &str, changes: &str) -> String {
    format!(
        "Generate the complete, corrected content for this file.\n\n\
         File: {file}\n\
         Changes needed: {changes}\n\n\
         If this is a new file, provide the complete file content. \
         If this is a modification, provide the complete corrected file."
    )
}

/// Runs the analysis and per-fix generation calls.
#[derive(Clone)]
pub struct Diagnoser {
    provider: Arc<dyn AIProvider>,
}

impl Diagnoser {
    #[must_use]
    pub fn new(provider: Arc<dyn AIProvider>) -> Self {
        Self { provider }
    }

    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.provider.is_configured()
    }

    /// Diagnose a downtime event. Never returns a partial diagnosis.
    pub async fn diagnose(&self, url: &str, error_detail: &str) -> DiagnosisOutcome {
        match self.try_diagnose(url, error_detail).await {
            Ok(diagnosis) => {
                info!(
                    provider = self.provider.name(),
                    priority = %diagnosis.priority,
                    fixes = diagnosis.fixes.len(),
                    "Issue analyzed"
                );
                DiagnosisOutcome::Ready(diagnosis)
            }
            Err(e) => {
                let outcome = DiagnosisOutcome::from(e);
                warn!(provider = self.provider.name(), outcome = %outcome.describe(), "Diagnosis unavailable");
                outcome
            }
        }
    }

    async fn try_diagnose(&self, url: &str, error_detail: &str) -> Result<Diagnosis, DiagnoseError> {
        let analysis_options = GenerateOptions {
            temperature: Some(0.2),
            json_mode: true,
            ..GenerateOptions::default()
        };
        let response = self
            .provider
            .generate_text(
                &[
                    AIMessage::system(ANALYSIS_SYSTEM),
                    AIMessage::user(analysis_prompt(url, error_detail)),
                ],
                &analysis_options,
            )
            .await?;
        debug!(model = %response.model, tokens = response.usage.total_tokens, "Analysis response received");

        let analysis = parse_analysis(&response.text)?;

        let fix_options = GenerateOptions {
            temperature: Some(0.2),
            ..GenerateOptions::default()
        };
        let mut fixes = Vec::with_capacity(analysis.fixes.len());
        for (file_path, change_description) in analysis.fixes {
            debug!(file = %file_path, "Generating fix content");
            let response = self
                .provider
                .generate_text(
                    &[
                        AIMessage::system(FIX_SYSTEM),
                        AIMessage::user(fix_prompt(&file_path, &change_description)),
                    ],
                    &fix_options,
                )
                .await?;
            fixes.push(Fix {
                file_path,
                change_description,
                generated_content: strip_code_fence(&response.text),
            });
        }

        Ok(Diagnosis {
            root_cause: analysis.root_cause,
            fixes,
            config_changes: analysis.config_changes,
            priority: analysis.priority,
            estimated_time: analysis.estimated_time,
        })
    }
}
