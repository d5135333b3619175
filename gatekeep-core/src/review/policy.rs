//! Review policy engine
//!
//! Turns one queue item into one [`ReviewDecision`]:
//!
//! 1. duplicate check against the recent fingerprint window (short-circuits)
//! 2. structural analysis through the [`Analyzer`]
//! 3. coverage validation of submitted test results
//! 4. documentation check
//! 5. final verdict from the [`Advisor`], with keyword fallback
//! 6. training feedback published to the author
//!
//! The engine never fails a review: capability errors and timeouts degrade
//! to fallback results.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use gatekeep_db::QueueItem;

use crate::advisor::{Advisor, AdvisorRequest};
use crate::config::PolicyConfig;
use crate::notify::{self, Notification, NotificationKind, Notifier};

use super::analysis::{AnalysisReport, Analyzer, DocsCheck, TestValidation};
use super::decision::{parse_reply, ParsedReply, ReviewDecision, Verdict};
use super::fingerprint::{fingerprint, FingerprintHistory};

/// Lifetime counters of an engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub total_reviews: u64,
    pub approvals: u64,
    pub rejections: u64,
    pub avg_score: f64,
    pub advisor_fallbacks: u64,
    pub duplicates: u64,
}

impl EngineStatus {
    fn record(&mut self, decision: &ReviewDecision) {
        let previous = self.total_reviews as f64;
        self.total_reviews += 1;
        self.avg_score =
            (self.avg_score * previous + f64::from(decision.score)) / self.total_reviews as f64;

        match decision.decision {
            Verdict::Approve => self.approvals += 1,
            Verdict::Reject => self.rejections += 1,
            Verdict::RequestChanges | Verdict::NeedsRetest => {}
        }
        if decision.is_duplicate() {
            self.duplicates += 1;
        }
    }
}

/// Decision logic of the pipeline
pub struct ReviewPolicyEngine {
    advisor: Arc<dyn Advisor>,
    analyzer: Arc<dyn Analyzer>,
    notifier: Arc<dyn Notifier>,
    config: PolicyConfig,
    call_timeout: Duration,
    history: FingerprintHistory,
    status: EngineStatus,
}

impl std::fmt::Debug for ReviewPolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewPolicyEngine")
            .field("advisor", &self.advisor.name())
            .field("analyzer", &self.analyzer.name())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl ReviewPolicyEngine {
    pub fn new(
        advisor: Arc<dyn Advisor>,
        analyzer: Arc<dyn Analyzer>,
        notifier: Arc<dyn Notifier>,
        config: PolicyConfig,
    ) -> Self {
        let history = FingerprintHistory::new(config.history_window);
        Self {
            advisor,
            analyzer,
            notifier,
            config,
            call_timeout: Duration::from_secs(30),
            history,
            status: EngineStatus::default(),
        }
    }

    /// Bound on each advisor and analyzer call
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Seed the duplicate window from previously reviewed items, newest first
    pub fn seed_history(&mut self, recently_reviewed: &[QueueItem]) {
        for item in recently_reviewed.iter().rev() {
            self.history
                .push(&item.id, fingerprint(&item.diff, self.config.fingerprint_prefix));
        }
        tracing::debug!(entries = self.history.len(), "Seeded duplicate history");
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    pub fn history(&self) -> &FingerprintHistory {
        &self.history
    }

    /// Review one item
    pub async fn review(&mut self, item: &QueueItem) -> ReviewDecision {
        let print = fingerprint(&item.diff, self.config.fingerprint_prefix);

        let decision = if self.history.matches(&print, &item.id) {
            tracing::warn!(
                queue_id = %item.short_id(),
                commit = %item.short_commit(),
                author = %item.author_agent,
                "Duplicate change detected"
            );
            ReviewDecision::duplicate(self.history.window())
        } else {
            self.assess(item).await
        };

        self.history.push(&item.id, print);
        self.status.record(&decision);

        tracing::info!(
            queue_id = %item.short_id(),
            decision = %decision.decision,
            score = decision.score,
            origin = ?decision.origin,
            "Review complete"
        );

        decision
    }

    /// Steps 2-6 for a change that is not a duplicate
    async fn assess(&mut self, item: &QueueItem) -> ReviewDecision {
        let analysis = self.analyze(item).await;
        let tests = TestValidation::evaluate(
            item.test_results.as_ref(),
            &item.files_changed,
            self.config.coverage_threshold,
        );
        let docs = DocsCheck::evaluate(&item.files_changed, &item.branch);

        let request = AdvisorRequest {
            author_agent: item.author_agent.clone(),
            commit_id: item.commit_id.clone(),
            branch: item.branch.clone(),
            diff_excerpt: item.diff.chars().take(self.config.diff_excerpt).collect(),
            analysis,
            tests,
            docs,
        };

        let mut decision = self.consult_advisor(&request).await;

        if let Some(feedback) = decision.training_feedback.as_mut() {
            if feedback.agent.is_empty() {
                feedback.agent = item.author_agent.clone();
            }
            let recipient = feedback.agent.clone();
            notify::publish(
                self.notifier.as_ref(),
                Notification::new(
                    recipient,
                    NotificationKind::TrainingFeedback,
                    json!({
                        "type": "training_feedback",
                        "commit_id": item.commit_id,
                        "issue": feedback.issue,
                        "training": feedback.training,
                    }),
                ),
            )
            .await;
        }

        decision
    }

    async fn analyze(&self, item: &QueueItem) -> AnalysisReport {
        let call = self.analyzer.analyze(&item.diff, &item.files_changed);
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::warn!(queue_id = %item.short_id(), error = %e, "Analyzer failed");
                AnalysisReport::unavailable(e.to_string())
            }
            Err(_) => {
                tracing::warn!(queue_id = %item.short_id(), "Analyzer timed out");
                AnalysisReport::unavailable(format!(
                    "analyzer timed out after {:?}",
                    self.call_timeout
                ))
            }
        }
    }

    async fn consult_advisor(&mut self, request: &AdvisorRequest) -> ReviewDecision {
        let reply = match tokio::time::timeout(self.call_timeout, self.advisor.advise(request)).await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return self.advisor_unavailable(request, e.to_string()),
            Err(_) => {
                return self.advisor_unavailable(
                    request,
                    format!("advisor timed out after {:?}", self.call_timeout),
                )
            }
        };

        match parse_reply(&reply) {
            ParsedReply::Valid(decision) => decision,
            ParsedReply::Fallback { decision, reason } => {
                self.status.advisor_fallbacks += 1;
                tracing::warn!(
                    commit = %request.commit_id,
                    %reason,
                    fallback = %decision.decision,
                    "Advisor reply unusable, using keyword fallback"
                );
                decision
            }
        }
    }

    /// No reply at all: the keyword scan has nothing to match
    fn advisor_unavailable(&mut self, request: &AdvisorRequest, reason: String) -> ReviewDecision {
        self.status.advisor_fallbacks += 1;
        tracing::warn!(commit = %request.commit_id, %reason, "Advisor unavailable");

        let mut decision = ReviewDecision::from_keywords("", reason.clone());
        decision.summary = format!("Advisor unavailable: {}", reason);
        decision
    }
}
