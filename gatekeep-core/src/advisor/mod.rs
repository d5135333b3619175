//! Decision-assist capability consulted for the final verdict

mod claude;

pub use claude::ClaudeAdvisor;

use async_trait::async_trait;
use serde::Serialize;

use crate::review::{AnalysisReport, DocsCheck, TestValidation};
use crate::Result;

/// System prompt given to the advisor
pub const REVIEWER_SYSTEM_PROMPT: &str = r#"You are the quality gate of an automated commit pipeline.

Review the change and decide one of:
- approve: follows project conventions, no duplication, adequate tests, docs current
- reject: duplicated change, failing or missing tests for critical logic, security risk
  (hardcoded secrets, injection), clear performance regression, trivial commit
- request_changes: works, but the design or tests should improve
- needs_retest: tests look flaky, the CI environment is inconsistent, or integration
  with other agents has to be verified

Reply with a single JSON object and nothing else:
{
  "decision": "approve|reject|request_changes|needs_retest",
  "score": 0-100,
  "summary": "two or three lines",
  "findings": ["..."],
  "risks": ["..."],
  "recommendations": ["..."],
  "training_feedback": {"agent": "...", "issue": "...", "training": "..."},
  "tests_required": ["integration", "..."]
}
Omit training_feedback unless the author shows a recurring bad pattern."#;

/// Everything the advisor gets to see about one change
#[derive(Debug, Clone, Serialize)]
pub struct AdvisorRequest {
    pub author_agent: String,
    pub commit_id: String,
    pub branch: String,
    /// Leading excerpt of the diff
    pub diff_excerpt: String,
    pub analysis: AnalysisReport,
    pub tests: TestValidation,
    pub docs: DocsCheck,
}

impl AdvisorRequest {
    /// Render the request as the user prompt
    pub fn render_prompt(&self) -> String {
        format!(
            "CHANGE UNDER REVIEW\n\
             - Agent: {agent}\n\
             - Commit: {commit} on {branch}\n\
             - Diff (excerpt):\n{diff}\n\
             - Structural analysis: {analysis}\n\
             - Test validation: {tests}\n\
             - Documentation updated: {docs}\n\n\
             Decide and reply with the JSON object described in your instructions: \
             decision, score, summary, findings, risks, recommendations, \
             training_feedback (only for a bad pattern) and tests_required.",
            agent = self.author_agent,
            commit = self.commit_id,
            branch = self.branch,
            diff = self.diff_excerpt,
            analysis = json(&self.analysis),
            tests = json(&self.tests),
            docs = self.docs.has_docs,
        )
    }
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

/// Trait for decision-assist backends
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Get the name of this advisor
    fn name(&self) -> &'static str;

    /// Send a request and return the raw reply text
    async fn advise(&self, request: &AdvisorRequest) -> Result<String>;
}
