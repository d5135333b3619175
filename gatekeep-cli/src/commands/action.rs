//! Action command - operator override of a review

use clap::Args;
use gatekeep_core::{apply_manual_action, Config, ManualAction};

use super::{open_queue, print_item_line};

/// Approve, reject or request changes on an item by hand
#[derive(Args, Debug)]
pub struct ActionArgs {
    /// Queue item id
    pub id: String,

    /// approve, reject or request_changes
    pub action: ManualAction,

    /// Note recorded with the decision
    #[arg(short, long)]
    pub feedback: Option<String>,
}

impl ActionArgs {
    /// Execute the action command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let queue = open_queue(config).await?;
        let item =
            apply_manual_action(&queue, &self.id, self.action, self.feedback.as_deref()).await?;

        println!("Applied {}:", self.action);
        print_item_line(&item);

        Ok(())
    }
}
