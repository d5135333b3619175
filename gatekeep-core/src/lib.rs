//! Gatekeep Core - review policy and scheduling for the commit pipeline
//!
//! Changes submitted to the review queue are classified by the
//! [`ReviewPolicyEngine`] and driven through testing and integration by the
//! [`ReviewScheduler`]. External capabilities (advisor, analyzer, test gate,
//! merge executor, notifier) sit behind traits so they can be swapped.

pub mod advisor;
pub mod config;
pub mod error;
mod git;
pub mod integration;
pub mod notify;
pub mod operator;
pub mod review;
pub mod scheduler;
pub mod testing;

pub use advisor::{Advisor, AdvisorRequest, ClaudeAdvisor};
pub use config::{CliOverrides, Config};
pub use error::{Error, Result};
pub use integration::{GitMergeExecutor, IntegrationExecutor};
pub use notify::{ChannelNotifier, Notification, NotificationKind, Notifier, TracingNotifier};
pub use operator::{apply_manual_action, ManualAction};
pub use review::{
    Analyzer, EngineStatus, HeuristicAnalyzer, ReviewDecision, ReviewPolicyEngine, Verdict,
};
pub use scheduler::{
    CycleReport, ItemOutcome, RetrospectiveReport, ReviewScheduler, SchedulerMetrics, MAX_RETRIES,
};
pub use testing::{CommandTestGate, TestGate, TestOutcome};
