//! End-to-end scheduler cycles against an in-memory queue

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use gatekeep_core::config::{PolicyConfig, SchedulerConfig};
use gatekeep_core::{
    Advisor, AdvisorRequest, ChannelNotifier, Error, HeuristicAnalyzer, IntegrationExecutor,
    Notification, NotificationKind, Result, ReviewPolicyEngine, ReviewScheduler, TestGate,
    TestOutcome, MAX_RETRIES,
};
use gatekeep_db::{Database, NewQueueItem, QueueItem, QueueStatus, ReviewQueue};

const APPROVE: &str = r#"{"decision": "approve", "score": 88, "summary": "clean", "tests_required": []}"#;
const RETEST: &str = r#"{"decision": "needs_retest", "score": 60, "summary": "flaky"}"#;

/// Advisor that answers from a script, repeating the last reply
struct ScriptedAdvisor {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    calls: AtomicUsize,
}

impl ScriptedAdvisor {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            last: Mutex::new(APPROVE.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Advisor for ScriptedAdvisor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn advise(&self, _request: &AdvisorRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.replies.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }
}

struct FixedGate {
    passes: bool,
    runs: AtomicUsize,
}

impl FixedGate {
    fn new(passes: bool) -> Arc<Self> {
        Arc::new(Self {
            passes,
            runs: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TestGate for FixedGate {
    async fn run(&self, _item: &QueueItem, tests: &[String]) -> Result<TestOutcome> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(if self.passes {
            TestOutcome::passed(format!("{} green", tests.join(",")))
        } else {
            TestOutcome::failed(format!("{} red", tests.join(",")))
        })
    }
}

/// Merge executor that records merges, or fails them
struct RecordingMerger {
    fails: bool,
    merged: Mutex<Vec<(String, String)>>,
}

impl RecordingMerger {
    fn new(fails: bool) -> Arc<Self> {
        Arc::new(Self {
            fails,
            merged: Mutex::new(Vec::new()),
        })
    }

    fn merges(&self) -> Vec<(String, String)> {
        self.merged.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntegrationExecutor for RecordingMerger {
    async fn merge(&self, branch: &str, message: &str) -> Result<()> {
        if self.fails {
            return Err(Error::Integration("push rejected".to_string()));
        }
        self.merged
            .lock()
            .unwrap()
            .push((branch.to_string(), message.to_string()));
        Ok(())
    }
}

/// Merge executor that closes the item behind the scheduler's back
struct MeddlingMerger {
    queue: ReviewQueue,
    target: Mutex<Option<String>>,
    inner: Arc<RecordingMerger>,
}

#[async_trait]
impl IntegrationExecutor for MeddlingMerger {
    async fn merge(&self, branch: &str, message: &str) -> Result<()> {
        let target = self.target.lock().unwrap().clone();
        if let (Some(id), "feature/meddled") = (target, branch) {
            self.queue
                .update_status(&id, QueueStatus::Rejected, None)
                .await?;
            return Err(Error::Integration("branch vanished".to_string()));
        }
        self.inner.merge(branch, message).await
    }
}

struct Harness {
    queue: ReviewQueue,
    scheduler: ReviewScheduler,
    advisor: Arc<ScriptedAdvisor>,
    notifications: UnboundedReceiver<Notification>,
}

impl Harness {
    async fn new(
        advisor: Arc<ScriptedAdvisor>,
        gate: Arc<dyn TestGate>,
        merger: Arc<dyn IntegrationExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        let db = Database::in_memory().await.unwrap();
        Self::with_queue(db.queue(), advisor, gate, merger, config)
    }

    fn with_queue(
        queue: ReviewQueue,
        advisor: Arc<ScriptedAdvisor>,
        gate: Arc<dyn TestGate>,
        merger: Arc<dyn IntegrationExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        let (notifier, notifications) = ChannelNotifier::new();
        let notifier = Arc::new(notifier);
        let engine = ReviewPolicyEngine::new(
            advisor.clone(),
            Arc::new(HeuristicAnalyzer::new()),
            notifier.clone(),
            PolicyConfig::default(),
        );
        let scheduler = ReviewScheduler::new(queue.clone(), engine, gate, merger, notifier, config)
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(5));

        Self {
            queue,
            scheduler,
            advisor,
            notifications,
        }
    }

    async fn submit(&self, commit: &str, branch: &str, diff: &str) -> String {
        self.queue
            .submit(NewQueueItem::new(
                commit,
                branch,
                "go_agent",
                diff,
                vec!["main.go".to_string()],
            ))
            .await
            .unwrap()
    }

    async fn cycle(&mut self) -> gatekeep_core::CycleReport {
        self.scheduler
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap()
    }

    async fn item(&self, id: &str) -> QueueItem {
        self.queue.get_item(id).await.unwrap().unwrap()
    }

    fn drain(&mut self) -> Vec<Notification> {
        let mut sent = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            sent.push(n);
        }
        sent
    }
}

fn config() -> SchedulerConfig {
    SchedulerConfig {
        poll_interval: Duration::from_millis(20),
        retrospective_every: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_batch_follows_priority_then_age() {
    let merger = RecordingMerger::new(false);
    let mut h = Harness::new(
        ScriptedAdvisor::new(&[]),
        FixedGate::new(true),
        merger.clone(),
        config(),
    )
    .await;

    let y = h.submit("bbbbbbb1", "feature/y", "+y\n").await;
    let z = h.submit("ccccccc1", "feature/z", "+z\n").await;
    let x = h
        .queue
        .submit(
            NewQueueItem::new("aaaaaaa1", "feature/x", "go_agent", "+x\n", vec![])
                .with_priority(5),
        )
        .await
        .unwrap();

    let report = h.cycle().await;
    let order: Vec<_> = report.processed.iter().map(|o| o.queue_id.clone()).collect();
    assert_eq!(order, vec![x, y, z]);

    let branches: Vec<_> = merger.merges().into_iter().map(|(b, _)| b).collect();
    assert_eq!(branches, vec!["feature/x", "feature/y", "feature/z"]);
}

#[tokio::test]
async fn test_batch_size_bounds_a_cycle() {
    let mut h = Harness::new(
        ScriptedAdvisor::new(&[]),
        FixedGate::new(true),
        RecordingMerger::new(false),
        SchedulerConfig {
            batch_size: 2,
            ..config()
        },
    )
    .await;

    for i in 0..3 {
        h.submit(&format!("c{}", i), "feature/b", &format!("+{}\n", i)).await;
    }

    assert_eq!(h.cycle().await.processed.len(), 2);
    assert_eq!(h.cycle().await.processed.len(), 1);
    assert!(h.cycle().await.processed.is_empty());
}

#[tokio::test]
async fn test_retry_budget_is_exhausted() {
    let advisor = ScriptedAdvisor::new(&[RETEST]);
    let mut h = Harness::new(
        advisor.clone(),
        FixedGate::new(true),
        RecordingMerger::new(false),
        config(),
    )
    .await;
    let id = h.submit("deadbeef", "feature/flaky", "+flaky\n").await;

    for expected in 1..=MAX_RETRIES {
        let report = h.cycle().await;
        assert_eq!(report.count(QueueStatus::NeedsRetest), 1);
        let item = h.item(&id).await;
        assert_eq!(item.status, QueueStatus::NeedsRetest);
        assert_eq!(item.retry_count, expected);
    }

    let report = h.cycle().await;
    assert_eq!(report.count(QueueStatus::FailedAfterRetries), 1);
    let item = h.item(&id).await;
    assert_eq!(item.status, QueueStatus::FailedAfterRetries);
    assert_eq!(item.retry_count, MAX_RETRIES);
    assert_eq!(advisor.calls(), MAX_RETRIES as usize + 1);

    // terminal: no longer picked up
    assert!(h.cycle().await.processed.is_empty());

    let feedback: Vec<_> = h
        .drain()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::ReviewFeedback)
        .collect();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].payload["status"], "failed_after_retries");
}

#[tokio::test]
async fn test_duplicate_is_rejected_without_advisor() {
    let advisor = ScriptedAdvisor::new(&[]);
    let mut h = Harness::new(
        advisor.clone(),
        FixedGate::new(true),
        RecordingMerger::new(false),
        config(),
    )
    .await;

    h.submit("1111111", "feature/a", "+same body\n").await;
    h.cycle().await;
    assert_eq!(advisor.calls(), 1);

    let dup = h.submit("2222222", "feature/b", "+same body\n").await;
    let report = h.cycle().await;
    assert_eq!(report.count(QueueStatus::Rejected), 1);
    assert_eq!(advisor.calls(), 1);

    let item = h.item(&dup).await;
    assert_eq!(item.status, QueueStatus::Rejected);
    assert_eq!(item.score(), Some(0));
    assert!(item.was_duplicate());
}

#[tokio::test]
async fn test_failing_required_tests_send_item_to_retest() {
    let advisor = ScriptedAdvisor::new(&[
        r#"{"decision": "approve", "score": 85, "tests_required": ["integration"]}"#,
    ]);
    let gate = FixedGate::new(false);
    let merger = RecordingMerger::new(false);
    let mut h = Harness::new(advisor, gate.clone(), merger.clone(), config()).await;
    let id = h.submit("3333333", "feature/t", "+t\n").await;

    let report = h.cycle().await;
    assert_eq!(report.count(QueueStatus::NeedsRetest), 1);
    assert_eq!(gate.runs.load(Ordering::SeqCst), 1);
    assert!(merger.merges().is_empty());

    let item = h.item(&id).await;
    assert_eq!(item.status, QueueStatus::NeedsRetest);
    assert_eq!(item.retry_count, 1);
    let result = item.review_result.unwrap();
    assert_eq!(result["test_gate"]["passed"], false);
}

#[tokio::test]
async fn test_passing_required_tests_then_merge() {
    let advisor = ScriptedAdvisor::new(&[
        r#"{"decision": "approve", "score": 85, "tests_required": ["unit"]}"#,
    ]);
    let gate = FixedGate::new(true);
    let merger = RecordingMerger::new(false);
    let mut h = Harness::new(advisor, gate.clone(), merger.clone(), config()).await;
    let id = h.submit("4444444abc", "feature/ok", "+ok\n").await;

    h.cycle().await;
    assert_eq!(gate.runs.load(Ordering::SeqCst), 1);
    assert_eq!(h.item(&id).await.status, QueueStatus::Merged);
    assert_eq!(
        merger.merges(),
        vec![(
            "feature/ok".to_string(),
            "Merge 4444444 (review approved)".to_string()
        )]
    );
}

#[tokio::test]
async fn test_approval_without_tests_merges() {
    let gate = FixedGate::new(false);
    let merger = RecordingMerger::new(false);
    let mut h = Harness::new(ScriptedAdvisor::new(&[APPROVE]), gate.clone(), merger.clone(), config())
        .await;
    let id = h.submit("5555555", "feature/m", "+m\n").await;

    let report = h.cycle().await;
    assert_eq!(report.count(QueueStatus::Merged), 1);
    assert_eq!(gate.runs.load(Ordering::SeqCst), 0);
    assert_eq!(merger.merges().len(), 1);

    let item = h.item(&id).await;
    assert_eq!(item.status, QueueStatus::Merged);
    assert_eq!(item.decision(), Some("approve"));
    assert!(item.reviewed_at.is_some());
}

#[tokio::test]
async fn test_without_auto_merge_item_stays_approved() {
    let merger = RecordingMerger::new(false);
    let mut h = Harness::new(
        ScriptedAdvisor::new(&[]),
        FixedGate::new(true),
        merger.clone(),
        SchedulerConfig {
            auto_merge: false,
            ..config()
        },
    )
    .await;
    let id = h.submit("6666666", "feature/n", "+n\n").await;

    h.cycle().await;
    assert_eq!(h.item(&id).await.status, QueueStatus::Approved);
    assert!(merger.merges().is_empty());
}

#[tokio::test]
async fn test_failed_merge_leaves_item_approved() {
    let mut h = Harness::new(
        ScriptedAdvisor::new(&[]),
        FixedGate::new(true),
        RecordingMerger::new(true),
        config(),
    )
    .await;
    let id = h.submit("7777777", "feature/p", "+p\n").await;

    let report = h.cycle().await;
    assert_eq!(report.count(QueueStatus::Approved), 1);

    let item = h.item(&id).await;
    assert_eq!(item.status, QueueStatus::Approved);
    let result = item.review_result.unwrap();
    assert!(result["merge_error"].as_str().unwrap().contains("push rejected"));

    // approved items are not reviewed again
    assert!(h.cycle().await.processed.is_empty());
}

#[tokio::test]
async fn test_request_changes_and_reject_notify_author() {
    let advisor = ScriptedAdvisor::new(&[
        r#"{"decision": "request_changes", "score": 55, "summary": "split it"}"#,
        r#"{"decision": "reject", "score": 10, "summary": "wrong approach"}"#,
    ]);
    let mut h = Harness::new(
        advisor,
        FixedGate::new(true),
        RecordingMerger::new(false),
        config(),
    )
    .await;
    let first = h.submit("8888888", "feature/q", "+q\n").await;
    let second = h.submit("9999999", "feature/r", "+r\n").await;

    h.cycle().await;
    assert_eq!(h.item(&first).await.status, QueueStatus::RequestChanges);
    assert_eq!(h.item(&second).await.status, QueueStatus::Rejected);

    let sent = h.drain();
    let feedback: Vec<_> = sent
        .iter()
        .filter(|n| n.kind == NotificationKind::ReviewFeedback)
        .collect();
    assert_eq!(feedback.len(), 2);
    assert!(feedback.iter().all(|n| n.recipient == "go_agent"));
    assert_eq!(feedback[0].payload["summary"], "split it");
    assert_eq!(feedback[1].payload["decision"], "reject");

    let summary = sent
        .iter()
        .find(|n| n.kind == NotificationKind::CycleSummary)
        .unwrap();
    assert_eq!(summary.recipient, "all");
    assert_eq!(summary.payload["processed"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_item_failure_does_not_stop_the_batch() {
    let db = Database::in_memory().await.unwrap();
    let queue = db.queue();
    let inner = RecordingMerger::new(false);
    let merger = Arc::new(MeddlingMerger {
        queue: queue.clone(),
        target: Mutex::new(None),
        inner: inner.clone(),
    });
    let mut h = Harness::with_queue(
        queue,
        ScriptedAdvisor::new(&[]),
        FixedGate::new(true),
        merger.clone(),
        config(),
    );

    let bad = h.submit("aaaa111", "feature/meddled", "+bad\n").await;
    let good = h.submit("bbbb222", "feature/fine", "+good\n").await;
    *merger.target.lock().unwrap() = Some(bad.clone());

    let report = h.cycle().await;
    assert_eq!(report.processed.len(), 2);
    assert_eq!(report.processed[0].status, QueueStatus::Error);
    assert!(report.processed[0].error.is_some());
    assert_eq!(report.processed[1].status, QueueStatus::Merged);

    // the item was closed by someone else and stays that way
    assert_eq!(h.item(&bad).await.status, QueueStatus::Rejected);
    assert_eq!(h.item(&good).await.status, QueueStatus::Merged);
    assert_eq!(h.scheduler.metrics().item_errors, 1);
}

#[tokio::test]
async fn test_cancelled_cycle_processes_nothing() {
    let advisor = ScriptedAdvisor::new(&[]);
    let mut h = Harness::new(
        advisor.clone(),
        FixedGate::new(true),
        RecordingMerger::new(false),
        config(),
    )
    .await;
    let id = h.submit("c0ffee1", "feature/s", "+s\n").await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = h.scheduler.run_cycle(&cancel).await.unwrap();

    assert!(report.interrupted);
    assert!(report.processed.is_empty());
    assert_eq!(advisor.calls(), 0);
    assert_eq!(h.item(&id).await.status, QueueStatus::Pending);
}

#[tokio::test]
async fn test_run_stops_on_cancel() {
    let mut h = Harness::new(
        ScriptedAdvisor::new(&[]),
        FixedGate::new(true),
        RecordingMerger::new(false),
        SchedulerConfig {
            poll_interval: Duration::from_secs(3600),
            ..config()
        },
    )
    .await;
    let id = h.submit("c0ffee2", "feature/t", "+t\n").await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    tokio::time::timeout(Duration::from_secs(5), h.scheduler.run(cancel))
        .await
        .expect("scheduler did not stop")
        .unwrap();

    assert_eq!(h.scheduler.metrics().cycles, 1);
    assert_eq!(h.item(&id).await.status, QueueStatus::Merged);
}

#[tokio::test]
async fn test_prepare_seeds_duplicate_window_from_queue() {
    let db = Database::in_memory().await.unwrap();
    let queue = db.queue();

    let mut first = Harness::with_queue(
        queue.clone(),
        ScriptedAdvisor::new(&[]),
        FixedGate::new(true),
        RecordingMerger::new(false),
        config(),
    );
    first.submit("d00d001", "feature/u", "+reused\n").await;
    first.cycle().await;

    // a fresh scheduler over the same queue remembers the earlier review
    let advisor = ScriptedAdvisor::new(&[]);
    let mut second = Harness::with_queue(
        queue,
        advisor.clone(),
        FixedGate::new(true),
        RecordingMerger::new(false),
        config(),
    );
    second.scheduler.prepare().await.unwrap();
    let dup = second.submit("d00d002", "feature/v", "+reused\n").await;
    second.cycle().await;

    assert_eq!(advisor.calls(), 0);
    assert_eq!(second.item(&dup).await.status, QueueStatus::Rejected);
}

#[tokio::test]
async fn test_retrospective_dispatches_training() {
    let advisor = ScriptedAdvisor::new(&[
        r#"{"decision": "reject", "score": 20}"#,
        r#"{"decision": "reject", "score": 30}"#,
        r#"{"decision": "approve", "score": 90}"#,
    ]);
    let mut h = Harness::new(
        advisor,
        FixedGate::new(true),
        RecordingMerger::new(false),
        SchedulerConfig {
            retrospective_every: 1,
            agent_roster: vec!["go_agent".to_string(), "rust_agent".to_string()],
            ..config()
        },
    )
    .await;
    h.submit("e1", "feature/w1", "+w1\n").await;
    h.submit("e2", "feature/w2", "+w2\n").await;
    h.submit("e3", "feature/w3", "+w3\n").await;

    h.cycle().await;

    let training: Vec<_> = h
        .drain()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::TrainingRecommendation)
        .collect();
    assert_eq!(training.len(), 1);
    assert_eq!(training[0].recipient, "go_agent");
    assert_eq!(training[0].payload["reviews_count"], 3);
    assert_eq!(h.scheduler.metrics().training_feedback.get("go_agent"), Some(&1));

    let report = h.scheduler.retrospective("go_agent", 7).await.unwrap().unwrap();
    assert!(report.approved_pct < 60.0);
    assert!(h.scheduler.retrospective("rust_agent", 7).await.unwrap().is_none());
}

#[tokio::test]
async fn test_metrics_after_cycle() {
    let mut h = Harness::new(
        ScriptedAdvisor::new(&[APPROVE, r#"{"decision": "reject", "score": 5}"#]),
        FixedGate::new(true),
        RecordingMerger::new(false),
        SchedulerConfig {
            auto_merge: false,
            ..config()
        },
    )
    .await;
    h.submit("f1", "feature/f1", "+f1\n").await;
    h.submit("f2", "feature/f2", "+f2\n").await;
    h.cycle().await;

    let metrics = h.scheduler.metrics();
    assert_eq!(metrics.cycles, 1);
    assert_eq!(metrics.items_processed, 2);
    assert_eq!(metrics.outcomes.get("approved"), Some(&1));
    assert_eq!(metrics.outcomes.get("rejected"), Some(&1));
    assert_eq!(metrics.queue.total, 2);
    assert!((metrics.approval_rate - 0.5).abs() < 1e-9);
    assert_eq!(metrics.engine.total_reviews, 2);
}
