//! Review scheduler
//!
//! Drains the queue in cycles. Each cycle fetches a bounded batch, reviews
//! the items strictly one after another, writes every transition through to
//! the queue before moving on, and then publishes a summary. The loop sleeps
//! between cycles until the next poll or until it is cancelled.

pub mod metrics;
pub mod retrospective;

pub use metrics::SchedulerMetrics;
pub use retrospective::RetrospectiveReport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use gatekeep_db::{QueueItem, QueueStatus, ReviewQueue};

use crate::config::SchedulerConfig;
use crate::integration::{merge_message, IntegrationExecutor};
use crate::notify::{self, Notification, NotificationKind, Notifier, BROADCAST};
use crate::review::{ReviewDecision, ReviewPolicyEngine, Verdict};
use crate::testing::{TestGate, TestOutcome};
use crate::{Error, Result};

/// Retry budget of one item
///
/// The budget is checked before the counter moves: an item gets
/// `MAX_RETRIES` retests after its first review, and the retest verdict
/// after that ends it as `failed_after_retries`. The stored retry count
/// therefore never exceeds `MAX_RETRIES`, and the item is reviewed at most
/// `MAX_RETRIES + 1` times.
pub const MAX_RETRIES: u32 = 3;

/// Final status of one item within a cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub queue_id: String,
    pub commit_id: String,
    pub status: QueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What one cycle did
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub processed: Vec<ItemOutcome>,
    pub duration_ms: u64,
    /// Set when cancellation stopped the batch early
    pub interrupted: bool,
}

impl CycleReport {
    pub fn count(&self, status: QueueStatus) -> usize {
        self.processed.iter().filter(|o| o.status == status).count()
    }
}

/// The cyclic orchestrator of the pipeline
pub struct ReviewScheduler {
    queue: ReviewQueue,
    engine: ReviewPolicyEngine,
    test_gate: Arc<dyn TestGate>,
    integrator: Arc<dyn IntegrationExecutor>,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
    test_timeout: Duration,
    merge_timeout: Duration,
    metrics: SchedulerMetrics,
    cycle: u64,
}

impl std::fmt::Debug for ReviewScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewScheduler")
            .field("cycle", &self.cycle)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReviewScheduler {
    pub fn new(
        queue: ReviewQueue,
        engine: ReviewPolicyEngine,
        test_gate: Arc<dyn TestGate>,
        integrator: Arc<dyn IntegrationExecutor>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            queue,
            engine,
            test_gate,
            integrator,
            notifier,
            config,
            test_timeout: Duration::from_secs(45),
            merge_timeout: Duration::from_secs(60),
            metrics: SchedulerMetrics::default(),
            cycle: 0,
        }
    }

    /// Bounds on a test gate invocation and on a merge
    pub fn with_timeouts(mut self, tests: Duration, merge: Duration) -> Self {
        self.test_timeout = tests;
        self.merge_timeout = merge;
        self
    }

    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }

    pub fn engine(&self) -> &ReviewPolicyEngine {
        &self.engine
    }

    pub fn queue(&self) -> &ReviewQueue {
        &self.queue
    }

    /// Seed the engine's duplicate window from the queue
    pub async fn prepare(&mut self) -> Result<()> {
        let window = self.engine.history().window();
        let recent = self.queue.recently_reviewed(window).await?;
        self.engine.seed_history(&recent);
        Ok(())
    }

    /// Run cycles until `cancel` fires
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        self.prepare().await?;

        tracing::info!(
            poll_interval = ?self.config.poll_interval,
            batch_size = self.config.batch_size,
            auto_merge = self.config.auto_merge,
            run_tests = self.config.run_tests,
            "Review scheduler started"
        );

        while !cancel.is_cancelled() {
            if let Err(e) = self.run_cycle(&cancel).await {
                tracing::error!(cycle = self.cycle, error = %e, "Review cycle failed");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!(cycles = self.cycle, "Review scheduler stopped");
        Ok(())
    }

    /// One pass over the next batch of reviewable items
    ///
    /// Only a failing queue store makes this return an error; every other
    /// failure is contained to the item it happened on.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> Result<CycleReport> {
        let started = Instant::now();
        self.cycle += 1;
        let mut report = CycleReport {
            cycle: self.cycle,
            ..Default::default()
        };

        let items = self.queue.get_pending_items(self.config.batch_size).await?;
        if items.is_empty() {
            tracing::debug!(cycle = self.cycle, "Queue is empty");
        } else {
            tracing::info!(cycle = self.cycle, items = items.len(), "Processing batch");
        }

        for item in items {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }
            let outcome = self.process(item).await?;
            report.processed.push(outcome);
        }

        let duration = started.elapsed();
        report.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.metrics.record_cycle(duration);
        self.metrics.update_queue(self.queue.get_stats().await?);
        self.metrics.update_engine(self.engine.status());

        notify::publish(
            self.notifier.as_ref(),
            Notification::new(
                BROADCAST,
                NotificationKind::CycleSummary,
                serde_json::to_value(&report)?,
            ),
        )
        .await;

        tracing::info!(
            cycle = self.cycle,
            processed = report.processed.len(),
            duration_ms = report.duration_ms,
            "Cycle complete"
        );

        let every = self.config.retrospective_every;
        if every > 0 && self.cycle % every == 0 && !cancel.is_cancelled() {
            self.run_retrospectives().await;
        }

        Ok(report)
    }

    /// Review one item and contain whatever goes wrong to it
    async fn process(&mut self, item: QueueItem) -> Result<ItemOutcome> {
        tracing::info!(
            queue_id = %item.short_id(),
            commit = %item.short_commit(),
            author = %item.author_agent,
            branch = %item.branch,
            "Reviewing"
        );

        let (status, error) = match self.review_item(&item).await {
            Ok(status) => (status, None),
            Err(e) if e.is_persistence_failure() => return Err(e),
            Err(e) => {
                tracing::error!(queue_id = %item.short_id(), error = %e, "Item processing failed");
                self.mark_error(&item, &e).await?;
                (QueueStatus::Error, Some(e.to_string()))
            }
        };

        let latency = (Utc::now() - item.created_at).to_std().unwrap_or_default();
        self.metrics.record_outcome(status, latency);

        Ok(ItemOutcome {
            queue_id: item.id,
            commit_id: item.commit_id,
            status,
            error,
        })
    }

    async fn mark_error(&self, item: &QueueItem, error: &Error) -> Result<()> {
        let payload = json!({"error": error.to_string()});
        match self
            .queue
            .update_status(&item.id, QueueStatus::Error, Some(&payload))
            .await
        {
            Ok(_) => Ok(()),
            Err(e @ gatekeep_db::Error::InvalidTransition { .. }) => {
                tracing::warn!(queue_id = %item.short_id(), error = %e, "Item already terminal");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn review_item(&mut self, item: &QueueItem) -> Result<QueueStatus> {
        let decision = self.engine.review(item).await;
        if let Some(ref feedback) = decision.training_feedback {
            self.metrics.record_training(&feedback.agent);
        }
        let result = decision.to_value();

        match decision.decision {
            Verdict::Approve => self.approve(item, &decision, result).await,
            Verdict::RequestChanges => {
                self.set_status(item, QueueStatus::RequestChanges, &result).await?;
                self.notify_author(item, &decision, QueueStatus::RequestChanges).await;
                Ok(QueueStatus::RequestChanges)
            }
            Verdict::Reject => {
                self.set_status(item, QueueStatus::Rejected, &result).await?;
                self.notify_author(item, &decision, QueueStatus::Rejected).await;
                Ok(QueueStatus::Rejected)
            }
            Verdict::NeedsRetest => self.retest(item, &decision, result).await,
        }
    }

    async fn approve(
        &self,
        item: &QueueItem,
        decision: &ReviewDecision,
        mut result: Value,
    ) -> Result<QueueStatus> {
        if self.config.run_tests && !decision.tests_required.is_empty() {
            let outcome = self.run_tests(item, &decision.tests_required).await;
            result["test_gate"] = serde_json::to_value(&outcome)?;
            if !outcome.passed {
                return self.retest(item, decision, result).await;
            }
        }

        self.set_status(item, QueueStatus::Approved, &result).await?;
        if !self.config.auto_merge {
            return Ok(QueueStatus::Approved);
        }

        let message = merge_message(item.short_commit());
        let merged = match tokio::time::timeout(
            self.merge_timeout,
            self.integrator.merge(&item.branch, &message),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("merge timed out after {:?}", self.merge_timeout)),
        };

        match merged {
            Ok(()) => {
                self.set_status(item, QueueStatus::Merged, &result).await?;
                tracing::info!(queue_id = %item.short_id(), branch = %item.branch, "Merged");
                Ok(QueueStatus::Merged)
            }
            Err(reason) => {
                // Stays approved; an operator or a later action picks it up
                tracing::error!(
                    queue_id = %item.short_id(),
                    branch = %item.branch,
                    error = %reason,
                    "Automatic merge failed"
                );
                result["merge_error"] = Value::String(reason);
                self.set_status(item, QueueStatus::Approved, &result).await?;
                Ok(QueueStatus::Approved)
            }
        }
    }

    async fn run_tests(&self, item: &QueueItem, tests: &[String]) -> TestOutcome {
        match tokio::time::timeout(self.test_timeout, self.test_gate.run(item, tests)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => TestOutcome::failed(format!("tests could not run: {}", e)),
            Err(_) => TestOutcome::failed(format!("tests timed out after {:?}", self.test_timeout)),
        }
    }

    /// Consume a retry, or give up once the budget is spent
    async fn retest(
        &self,
        item: &QueueItem,
        decision: &ReviewDecision,
        mut result: Value,
    ) -> Result<QueueStatus> {
        if item.retry_count >= MAX_RETRIES {
            result["retry_count"] = json!(item.retry_count);
            self.set_status(item, QueueStatus::FailedAfterRetries, &result).await?;
            tracing::warn!(
                queue_id = %item.short_id(),
                retries = item.retry_count,
                "Retry budget exhausted"
            );
            self.notify_author(item, decision, QueueStatus::FailedAfterRetries).await;
            return Ok(QueueStatus::FailedAfterRetries);
        }

        let retries = self.queue.increment_retry(&item.id).await?;
        result["retry_count"] = json!(retries);
        self.set_status(item, QueueStatus::NeedsRetest, &result).await?;
        tracing::info!(queue_id = %item.short_id(), retries, "Queued for retest");
        Ok(QueueStatus::NeedsRetest)
    }

    async fn set_status(&self, item: &QueueItem, status: QueueStatus, result: &Value) -> Result<()> {
        if self.queue.update_status(&item.id, status, Some(result)).await? {
            Ok(())
        } else {
            Err(Error::Other(format!("queue item {} disappeared", item.id)))
        }
    }

    async fn notify_author(&self, item: &QueueItem, decision: &ReviewDecision, status: QueueStatus) {
        notify::publish(
            self.notifier.as_ref(),
            Notification::new(
                item.author_agent.clone(),
                NotificationKind::ReviewFeedback,
                json!({
                    "type": "review_result",
                    "queue_id": item.id,
                    "commit_id": item.commit_id,
                    "status": status,
                    "decision": decision.decision,
                    "score": decision.score,
                    "summary": decision.summary,
                    "findings": decision.findings,
                    "recommendations": decision.recommendations,
                }),
            ),
        )
        .await;
    }

    /// Retrospective of one agent over the last `period_days`
    pub async fn retrospective(
        &self,
        agent: &str,
        period_days: u32,
    ) -> Result<Option<RetrospectiveReport>> {
        let since = Utc::now() - chrono::Duration::days(i64::from(period_days));
        let reviews = self.queue.reviewed_by_author_since(agent, since).await?;
        Ok(RetrospectiveReport::from_reviews(agent, period_days, &reviews))
    }

    /// Retrospective over the whole roster; dispatches training below the floor
    pub async fn run_retrospectives(&mut self) {
        tracing::info!(agents = self.config.agent_roster.len(), "Running retrospective");
        let period = self.config.retrospective_period_days;

        for agent in self.config.agent_roster.clone() {
            let report = match self.retrospective(&agent, period).await {
                Ok(Some(report)) => report,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(%agent, error = %e, "Retrospective failed");
                    continue;
                }
            };

            tracing::info!(
                %agent,
                approved_pct = report.approved_pct,
                avg_score = report.avg_score,
                "Retrospective"
            );

            if report.is_below(self.config.approval_rate_floor) {
                tracing::warn!(
                    %agent,
                    approved_pct = report.approved_pct,
                    "Low approval rate, sending training"
                );
                self.metrics.record_training(&agent);
                notify::publish(
                    self.notifier.as_ref(),
                    Notification::new(
                        agent.clone(),
                        NotificationKind::TrainingRecommendation,
                        serde_json::to_value(&report).unwrap_or(Value::Null),
                    ),
                )
                .await;
            }
        }
    }

    /// Sweep merged items older than the retention period
    pub async fn cleanup(&self) -> Result<u64> {
        Ok(self
            .queue
            .cleanup_old_items(self.config.retention_days)
            .await?)
    }
}
