//! Integration of approved changes into the target branch

mod git;

pub use git::GitMergeExecutor;

use async_trait::async_trait;

use crate::Result;

/// Capability that performs the actual merge of an approved change
#[async_trait]
pub trait IntegrationExecutor: Send + Sync {
    /// Merge `branch` into the target branch with `message`
    async fn merge(&self, branch: &str, message: &str) -> Result<()>;
}

/// Commit message used for an automatic merge
pub fn merge_message(short_commit: &str) -> String {
    format!("Merge {} (review approved)", short_commit)
}
