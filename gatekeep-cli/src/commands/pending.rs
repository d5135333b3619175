//! Pending command - what the next cycles will pick up

use clap::Args;
use gatekeep_core::Config;

use super::{open_queue, print_item_line};

/// List items waiting for review, in review order
#[derive(Args, Debug)]
pub struct PendingArgs {
    /// Maximum number of items
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

impl PendingArgs {
    /// Execute the pending command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let queue = open_queue(config).await?;
        let items = queue.get_pending_items(self.limit).await?;

        if items.is_empty() {
            println!("No items waiting for review.");
            return Ok(());
        }

        println!("Waiting for review ({}):", items.len());
        println!();
        for item in &items {
            print_item_line(item);
        }

        Ok(())
    }
}
