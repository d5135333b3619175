//! Show command - full detail of one queue item

use clap::Args;
use gatekeep_core::Config;

use super::open_queue;

/// Show one queue item
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Queue item id
    pub id: String,

    /// Include the diff
    #[arg(long)]
    pub diff: bool,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

impl ShowArgs {
    /// Execute the show command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let queue = open_queue(config).await?;
        let item = queue
            .get_item(&self.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Queue item {} not found", self.id))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&item)?);
            return Ok(());
        }

        println!("Queue item {}", item.id);
        println!();
        println!("  Commit:   {}", item.commit_id);
        println!("  Branch:   {}", item.branch);
        println!("  Author:   {}", item.author_agent);
        println!("  Status:   {}", item.status);
        println!("  Priority: {}", item.priority);
        println!("  Retries:  {}", item.retry_count);
        println!("  Created:  {}", item.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
        if let Some(reviewed) = item.reviewed_at {
            println!("  Reviewed: {}", reviewed.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        if let Some(ref tests) = item.test_results {
            println!(
                "  Tests:    {:.1}% coverage, {} passed, {} failed",
                tests.coverage, tests.passed, tests.failed
            );
        }

        if !item.files_changed.is_empty() {
            println!();
            println!("Files:");
            for file in &item.files_changed {
                println!("  {}", file);
            }
        }

        if let Some(ref result) = item.review_result {
            println!();
            println!("Last review:");
            println!("{}", serde_json::to_string_pretty(result)?);
        }

        if self.diff {
            println!();
            println!("{}", item.diff);
        }

        Ok(())
    }
}
