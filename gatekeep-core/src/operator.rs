//! Manual operator actions on queue items

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde_json::json;

use gatekeep_db::{QueueItem, QueueStatus, ReviewQueue};

use crate::review::Verdict;
use crate::{Error, Result};

/// Reviewer recorded on manual actions
pub const OPERATOR: &str = "operator";

/// Decision an operator can force on an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualAction {
    Approve,
    Reject,
    RequestChanges,
}

impl ManualAction {
    pub fn as_str(&self) -> &'static str {
        self.verdict().as_str()
    }

    pub fn verdict(&self) -> Verdict {
        match self {
            ManualAction::Approve => Verdict::Approve,
            ManualAction::Reject => Verdict::Reject,
            ManualAction::RequestChanges => Verdict::RequestChanges,
        }
    }

    /// Status the item moves to
    pub fn status(&self) -> QueueStatus {
        match self {
            ManualAction::Approve => QueueStatus::Approved,
            ManualAction::Reject => QueueStatus::Rejected,
            ManualAction::RequestChanges => QueueStatus::RequestChanges,
        }
    }
}

impl fmt::Display for ManualAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManualAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "approve" => Ok(ManualAction::Approve),
            "reject" => Ok(ManualAction::Reject),
            "request_changes" => Ok(ManualAction::RequestChanges),
            other => Err(Error::Other(format!(
                "Unknown action '{}'. Use approve, reject or request_changes",
                other
            ))),
        }
    }
}

/// Apply an operator decision to an item and return its new state
pub async fn apply_manual_action(
    queue: &ReviewQueue,
    id: &str,
    action: ManualAction,
    feedback: Option<&str>,
) -> Result<QueueItem> {
    let result = json!({
        "action": action.as_str(),
        "decision": action.verdict(),
        "feedback": feedback.unwrap_or_default(),
        "reviewed_by": OPERATOR,
        "timestamp": Utc::now().to_rfc3339(),
    });

    if !queue.update_status(id, action.status(), Some(&result)).await? {
        return Err(gatekeep_db::Error::NotFound(format!("Queue item {} not found", id)).into());
    }

    tracing::info!(queue_id = %id, %action, "Manual action applied");

    queue
        .get_item(id)
        .await?
        .ok_or_else(|| gatekeep_db::Error::NotFound(format!("Queue item {} not found", id)).into())
}
