//! Test gate: runs the tests an approval asks for before merging

mod checkout;
mod runner;

pub use checkout::{default_worktree_root, worktree_name, BranchCheckout};
pub use runner::{TestFramework, TestResults, TestRunner};

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gatekeep_db::QueueItem;

use crate::Result;

/// Verdict of one test gate invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub passed: bool,
    pub summary: String,
}

impl TestOutcome {
    pub fn passed(summary: impl Into<String>) -> Self {
        Self {
            passed: true,
            summary: summary.into(),
        }
    }

    pub fn failed(summary: impl Into<String>) -> Self {
        Self {
            passed: false,
            summary: summary.into(),
        }
    }
}

/// Capability that executes a named set of tests
#[async_trait]
pub trait TestGate: Send + Sync {
    /// Run `tests` against the change in `item`
    async fn run(&self, item: &QueueItem, tests: &[String]) -> Result<TestOutcome>;
}

/// Runs the project's own test command, once per required test identifier,
/// in a throwaway worktree of the item's branch
#[derive(Debug, Clone)]
pub struct CommandTestGate {
    repo: PathBuf,
    remote: String,
    worktree_root: PathBuf,
    framework: Option<TestFramework>,
}

impl CommandTestGate {
    /// Gate checking branches out of the repository containing `repo`
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            remote: "origin".to_string(),
            worktree_root: default_worktree_root(),
            framework: None,
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Directory the per-item worktrees are created under
    pub fn with_worktree_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.worktree_root = root.into();
        self
    }

    /// Skip detection and always use `framework`
    pub fn with_framework(mut self, framework: TestFramework) -> Self {
        self.framework = Some(framework);
        self
    }

    pub fn framework(&self) -> Option<TestFramework> {
        self.framework
    }

    async fn run_in(
        &self,
        runner: &TestRunner,
        item: &QueueItem,
        tests: &[String],
    ) -> TestOutcome {
        let mut failures = Vec::new();
        let mut lines = Vec::with_capacity(tests.len());

        for test in tests {
            tracing::info!(queue_id = %item.short_id(), test = %test, "Running required tests");
            let results = runner.run(Some(test)).await;
            let summary = results.summary();
            if !results.is_green() {
                failures.push(test.clone());
            }
            lines.push(format!("{}: {}", test, summary));
        }

        let summary = lines.join("; ");
        if failures.is_empty() {
            TestOutcome::passed(summary)
        } else {
            tracing::warn!(
                queue_id = %item.short_id(),
                failed = ?failures,
                "Required tests did not pass"
            );
            TestOutcome::failed(summary)
        }
    }
}

#[async_trait]
impl TestGate for CommandTestGate {
    async fn run(&self, item: &QueueItem, tests: &[String]) -> Result<TestOutcome> {
        if tests.is_empty() {
            return Ok(TestOutcome::passed("no tests required"));
        }

        let path = self
            .worktree_root
            .join(worktree_name(&item.branch, item.short_id()));
        let checkout = BranchCheckout::create(&self.repo, &self.remote, &item.branch, &path).await?;

        let mut runner = TestRunner::new(checkout.path());
        if let Some(framework) = self.framework {
            runner = runner.with_framework(framework);
        }
        tracing::debug!(
            queue_id = %item.short_id(),
            commit = %checkout.commit(),
            framework = ?runner.framework(),
            "Testing branch checkout"
        );

        let outcome = self.run_in(&runner, item, tests).await;
        checkout.remove().await;
        Ok(outcome)
    }
}
