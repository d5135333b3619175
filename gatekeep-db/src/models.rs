//! Data models for review queue records

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Status of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for its first review
    #[default]
    Pending,
    /// Picked up by the scheduler
    InReview,
    /// Approved, not (yet) merged
    Approved,
    /// Rejected (terminal)
    Rejected,
    /// Author has to rework the change
    RequestChanges,
    /// Eligible for another review pass
    NeedsRetest,
    /// Integrated into the target branch (terminal)
    Merged,
    /// Retry budget exhausted (terminal)
    FailedAfterRetries,
    /// Processing failed unexpectedly
    Error,
}

impl QueueStatus {
    /// Every status, in lifecycle order
    pub const ALL: [QueueStatus; 9] = [
        QueueStatus::Pending,
        QueueStatus::InReview,
        QueueStatus::Approved,
        QueueStatus::Rejected,
        QueueStatus::RequestChanges,
        QueueStatus::NeedsRetest,
        QueueStatus::Merged,
        QueueStatus::FailedAfterRetries,
        QueueStatus::Error,
    ];

    /// Statuses the scheduler picks up
    pub const REVIEWABLE: [QueueStatus; 2] = [QueueStatus::Pending, QueueStatus::NeedsRetest];

    /// Statuses that admit no further transition
    pub const TERMINAL: [QueueStatus; 3] = [
        QueueStatus::Merged,
        QueueStatus::Rejected,
        QueueStatus::FailedAfterRetries,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::InReview => "in_review",
            QueueStatus::Approved => "approved",
            QueueStatus::Rejected => "rejected",
            QueueStatus::RequestChanges => "request_changes",
            QueueStatus::NeedsRetest => "needs_retest",
            QueueStatus::Merged => "merged",
            QueueStatus::FailedAfterRetries => "failed_after_retries",
            QueueStatus::Error => "error",
        }
    }

    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        QueueStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidData(format!("Unknown queue status '{}'", s)))
    }
}

/// Test results supplied alongside a submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmittedTests {
    /// Line coverage in percent (0-100)
    pub coverage: f64,
    pub passed: u32,
    pub failed: u32,
}

impl SubmittedTests {
    pub fn new(coverage: f64) -> Self {
        Self {
            coverage,
            ..Default::default()
        }
    }

    pub fn with_counts(mut self, passed: u32, failed: u32) -> Self {
        self.passed = passed;
        self.failed = failed;
        self
    }
}

/// A change to be submitted to the queue
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub commit_id: String,
    pub branch: String,
    pub author_agent: String,
    pub diff: String,
    pub files_changed: Vec<String>,
    pub priority: i64,
    pub test_results: Option<SubmittedTests>,
}

impl NewQueueItem {
    /// Create a submission with default priority (0)
    pub fn new(
        commit_id: impl Into<String>,
        branch: impl Into<String>,
        author_agent: impl Into<String>,
        diff: impl Into<String>,
        files_changed: Vec<String>,
    ) -> Self {
        Self {
            commit_id: commit_id.into(),
            branch: branch.into(),
            author_agent: author_agent.into(),
            diff: diff.into(),
            files_changed,
            priority: 0,
            test_results: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_test_results(mut self, tests: SubmittedTests) -> Self {
        self.test_results = Some(tests);
        self
    }
}

/// One submitted change awaiting or having undergone review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub commit_id: String,
    pub branch: String,
    pub author_agent: String,
    pub diff: String,
    pub files_changed: Vec<String>,
    pub test_results: Option<SubmittedTests>,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Last decision payload, as stored
    pub review_result: Option<serde_json::Value>,
    pub retry_count: u32,
    pub priority: i64,
}

impl QueueItem {
    /// Score of the last decision, if any
    pub fn score(&self) -> Option<u8> {
        self.review_result
            .as_ref()
            .and_then(|r| r.get("score"))
            .and_then(|s| s.as_u64())
            .map(|s| s.min(100) as u8)
    }

    /// Decision name of the last review, if any
    pub fn decision(&self) -> Option<&str> {
        self.review_result
            .as_ref()
            .and_then(|r| r.get("decision"))
            .and_then(|d| d.as_str())
    }

    /// Whether the last review was a duplicate rejection
    pub fn was_duplicate(&self) -> bool {
        self.review_result
            .as_ref()
            .and_then(|r| r.get("duplication_score"))
            .is_some_and(|d| !d.is_null())
    }

    /// First 8 characters of the queue id, for log lines
    pub fn short_id(&self) -> &str {
        prefix(&self.id, 8)
    }

    /// First 7 characters of the commit id, for log lines
    pub fn short_commit(&self) -> &str {
        prefix(&self.commit_id, 7)
    }
}

fn prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Aggregate queue counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub merged: i64,
    pub rejected: i64,
    /// approved / max(approved + rejected, 1) * 100
    pub approval_rate: f64,
}

impl QueueStats {
    /// Build stats from per-status counts
    pub fn from_counts(counts: &[(QueueStatus, i64)]) -> Self {
        let count = |wanted: QueueStatus| {
            counts
                .iter()
                .filter(|(status, _)| *status == wanted)
                .map(|(_, n)| *n)
                .sum::<i64>()
        };

        let approved = count(QueueStatus::Approved);
        let rejected = count(QueueStatus::Rejected);

        Self {
            total: counts.iter().map(|(_, n)| *n).sum(),
            pending: count(QueueStatus::Pending),
            approved,
            merged: count(QueueStatus::Merged),
            rejected,
            approval_rate: approved as f64 / (approved + rejected).max(1) as f64 * 100.0,
        }
    }
}

/// Format a timestamp as fixed-width RFC 3339 so text order equals time order
pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidData(format!("Invalid timestamp '{}': {}", s, e)))
}
