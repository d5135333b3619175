//! Status command - queue counters

use clap::Args;
use gatekeep_core::Config;

use super::open_queue;

/// Show queue statistics
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let queue = open_queue(config).await?;
        let stats = queue.get_stats().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }

        println!("Review Queue");
        println!("============");
        println!();
        println!("  Total:    {}", stats.total);
        println!("  Pending:  {}", stats.pending);
        println!("  Approved: {}", stats.approved);
        println!("  Merged:   {}", stats.merged);
        println!("  Rejected: {}", stats.rejected);
        println!();
        println!("  Approval rate: {:.1}%", stats.approval_rate);

        let counts = queue.count_by_status().await?;
        if !counts.is_empty() {
            println!();
            println!("By status:");
            for (status, count) in counts {
                println!("  {:<22} {}", status.as_str(), count);
            }
        }

        Ok(())
    }
}
