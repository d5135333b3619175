//! CLI command implementations

pub mod action;
pub mod cleanup;
pub mod cycle;
pub mod pending;
pub mod retrospective;
pub mod serve;
pub mod show;
pub mod status;
pub mod submit;

pub use action::ActionArgs;
pub use cleanup::CleanupArgs;
pub use cycle::CycleArgs;
pub use pending::PendingArgs;
pub use retrospective::RetrospectiveArgs;
pub use serve::ServeArgs;
pub use show::ShowArgs;
pub use status::StatusArgs;
pub use submit::SubmitArgs;

use std::sync::Arc;

use async_trait::async_trait;
use gatekeep_core::{
    ClaudeAdvisor, CommandTestGate, Config, Error, GitMergeExecutor, HeuristicAnalyzer,
    IntegrationExecutor, ReviewPolicyEngine, ReviewScheduler, TracingNotifier,
};
use gatekeep_db::{Database, DatabaseConfig, QueueItem, ReviewQueue};

/// Open (and migrate) the queue database named by the configuration
pub async fn open_queue(config: &Config) -> anyhow::Result<ReviewQueue> {
    let db = Database::connect(DatabaseConfig::new(&config.database.path))
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to open database {}: {}",
                config.database.path.display(),
                e
            )
        })?;
    db.migrate().await?;
    Ok(db.queue())
}

/// Stand-in when no usable repository is configured; every merge fails
#[derive(Debug)]
struct NoRepository {
    reason: String,
}

#[async_trait]
impl IntegrationExecutor for NoRepository {
    async fn merge(&self, branch: &str, _message: &str) -> gatekeep_core::Result<()> {
        Err(Error::Integration(format!(
            "cannot merge {}: {}",
            branch, self.reason
        )))
    }
}

fn integrator(config: &Config) -> Arc<dyn IntegrationExecutor> {
    let settings = &config.integration;
    match GitMergeExecutor::open(
        &settings.repo_path,
        settings.remote.clone(),
        settings.target_branch.clone(),
    ) {
        Ok(executor) => Arc::new(executor),
        Err(e) => {
            if config.scheduler.auto_merge {
                tracing::warn!(
                    repo = %settings.repo_path.display(),
                    error = %e,
                    "No usable repository, approved items will not be merged"
                );
            }
            Arc::new(NoRepository {
                reason: e.to_string(),
            })
        }
    }
}

/// Wire the production capabilities into a scheduler
pub async fn build_scheduler(config: &Config) -> anyhow::Result<ReviewScheduler> {
    let queue = open_queue(config).await?;

    let mut advisor = ClaudeAdvisor::new().with_path(&config.advisor.claude_path);
    if let Some(ref model) = config.advisor.model {
        advisor = advisor.with_model(model);
    }
    if !advisor.is_available() {
        tracing::warn!(
            claude_path = %config.advisor.claude_path,
            "claude not found, reviews will fall back to request_changes"
        );
    }

    let notifier = Arc::new(TracingNotifier);
    let engine = ReviewPolicyEngine::new(
        Arc::new(advisor),
        Arc::new(HeuristicAnalyzer::new()),
        notifier.clone(),
        config.policy.clone(),
    )
    .with_call_timeout(config.advisor.timeout);

    let test_gate = Arc::new(
        CommandTestGate::new(&config.tests.workdir).with_remote(&config.integration.remote),
    );

    let scheduler = ReviewScheduler::new(
        queue,
        engine,
        test_gate,
        integrator(config),
        notifier,
        config.scheduler.clone(),
    )
    .with_timeouts(config.tests.timeout, config.integration.timeout);

    Ok(scheduler)
}

/// One summary line per item
pub fn print_item_line(item: &QueueItem) {
    println!(
        "  {}  {:<20} {:<8} {:<18} p{:<3} {}",
        item.short_id(),
        item.status.as_str(),
        item.short_commit(),
        item.author_agent,
        item.priority,
        item.branch
    );
}
