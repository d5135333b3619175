//! Cleanup command - sweep old merged items

use clap::Args;
use gatekeep_core::Config;

use super::open_queue;

/// Remove merged items older than the retention period
#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Retention in days (defaults to the configured value)
    #[arg(short, long)]
    pub days: Option<u32>,
}

impl CleanupArgs {
    /// Execute the cleanup command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let days = self.days.unwrap_or(config.scheduler.retention_days);
        let queue = open_queue(config).await?;
        let removed = queue.cleanup_old_items(days).await?;

        println!("Removed {} merged item(s) older than {} days.", removed, days);
        Ok(())
    }
}
