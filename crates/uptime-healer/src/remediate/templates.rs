//! Pull request body rendering using Handlebars.

use handlebars::Handlebars;
use serde::Serialize;

use super::{DowntimeContext, RemediationError};
use crate::diagnose::{Diagnosis, Fix};

const PULL_REQUEST: &str = "pull_request";

/// Context for the pull request body.
#[derive(Debug, Serialize)]
pub struct PullRequestContext<'a> {
    pub url: &'a str,
    pub error: &'a str,
    pub down_count: u32,
    pub priority: &'static str,
    pub root_cause: &'a str,
    pub fixes: &'a [Fix],
    pub config_changes: &'a [String],
    pub estimated_time: &'a str,
}

impl<'a> PullRequestContext<'a> {
    #[must_use]
    pub fn new(diagnosis: &'a Diagnosis, downtime: &'a DowntimeContext) -> Self {
        Self {
            url: &downtime.url,
            error: &downtime.error_detail,
            down_count: downtime.down_count,
            priority: diagnosis.priority.as_str(),
            root_cause: &diagnosis.root_cause,
            fixes: &diagnosis.fixes,
            config_changes: &diagnosis.config_changes,
            estimated_time: &diagnosis.estimated_time,
        }
    }
}

/// Template engine for remediation output.
pub struct TemplateEngine<'a> {
    handlebars: Handlebars<'a>,
}

impl TemplateEngine<'_> {
    /// Create the engine with the built-in templates registered.
    pub fn new() -> Result<Self, RemediationError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        // Output is markdown, not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string(PULL_REQUEST, include_str!("../../templates/pull_request.hbs"))
            .map_err(|e| RemediationError::Template(e.to_string()))?;
        Ok(Self { handlebars })
    }

    pub fn render_pull_request(&self, context: &PullRequestContext<'_>) -> Result<String, RemediationError> {
        self.handlebars
            .render(PULL_REQUEST, context)
            .map_err(|e| RemediationError::Template(e.to_string()))
    }
}

/// Commit message summarising the diagnosis.
#[must_use]
pub fn commit_message(diagnosis: &Diagnosis) -> String {
    format!(
        "🔧 Auto-fix: Website downtime issue detected\n\n- Root cause: {}\n- Priority: {}\n- Files modified: {}",
        diagnosis.root_cause,
        diagnosis.priority,
        diagnosis.fixes.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnose::Priority;

    fn diagnosis(config_changes: Vec<String>) -> Diagnosis {
        Diagnosis {
            root_cause: "Handler raises on <empty> input".to_string(),
            fixes: vec![Fix {
                file_path: "app/server.py".to_string(),
                change_description: "guard None".to_string(),
                generated_content: "x = 1".to_string(),
            }],
            config_changes,
            priority: Priority::High,
            estimated_time: "5 minutes".to_string(),
        }
    }

    fn downtime() -> DowntimeContext {
        DowntimeContext {
            url: "https://example.com".to_string(),
            error_detail: "HTTP 500".to_string(),
            down_count: 2,
        }
    }

    #[test]
    fn test_render_pull_request() {
        let engine = TemplateEngine::new().unwrap();
        let d = diagnosis(vec!["raise timeout".to_string()]);
        let ctx = downtime();
        let body = engine
            .render_pull_request(&PullRequestContext::new(&d, &ctx))
            .unwrap();

        assert!(body.contains("**Website:** https://example.com"));
        assert!(body.contains("**Issue Detected:** HTTP 500"));
        assert!(body.contains("**Priority:** HIGH"));
        assert!(body.contains("Handler raises on <empty> input"));
        assert!(body.contains("- **app/server.py**: guard None"));
        assert!(body.contains("- raise timeout"));
        assert!(body.contains("after 2 consecutive failed checks"));
    }

    #[test]
    fn test_render_without_config_changes() {
        let engine = TemplateEngine::new().unwrap();
        let d = diagnosis(vec![]);
        let ctx = downtime();
        let body = engine
            .render_pull_request(&PullRequestContext::new(&d, &ctx))
            .unwrap();
        assert!(body.contains("_None_"));
    }

    #[test]
    fn test_commit_message() {
        let message = commit_message(&diagnosis(vec![]));
        assert!(message.starts_with("🔧 Auto-fix"));
        assert!(message.contains("- Priority: HIGH"));
        assert!(message.contains("- Files modified: 1"));
    }
}
