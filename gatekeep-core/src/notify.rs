//! Outbound notifications to agents and operators

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Recipient of broadcast notifications such as cycle summaries
pub const BROADCAST: &str = "all";

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Outcome of reviewing one of the recipient's changes
    ReviewFeedback,
    /// Coaching note attached to a decision
    TrainingFeedback,
    /// Retrospective found the recipient below the approval floor
    TrainingRecommendation,
    /// Summary of one scheduler cycle
    CycleSummary,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ReviewFeedback => "review_feedback",
            NotificationKind::TrainingFeedback => "training_feedback",
            NotificationKind::TrainingRecommendation => "training_recommendation",
            NotificationKind::CycleSummary => "cycle_summary",
        }
    }
}

/// One outbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub kind: NotificationKind,
    pub payload: Value,
}

impl Notification {
    pub fn new(recipient: impl Into<String>, kind: NotificationKind, payload: Value) -> Self {
        Self {
            recipient: recipient.into(),
            kind,
            payload,
        }
    }
}

/// Notification delivery capability
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Publish a notification, logging instead of failing
pub async fn publish(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.notify(&notification).await {
        tracing::warn!(
            recipient = %notification.recipient,
            kind = notification.kind.as_str(),
            error = %e,
            "Failed to deliver notification"
        );
    }
}

/// Writes notifications to the log
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            recipient = %notification.recipient,
            kind = notification.kind.as_str(),
            payload = %notification.payload,
            "Notification"
        );
        Ok(())
    }
}

/// Forwards notifications over an in-process channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.tx
            .send(notification.clone())
            .map_err(|_| Error::Notify("notification channel closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_channel_notifier_delivers() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let sent = Notification::new(
            "go_agent",
            NotificationKind::ReviewFeedback,
            json!({"decision": "reject"}),
        );
        notifier.notify(&sent).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn test_channel_notifier_closed() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        let result = notifier
            .notify(&Notification::new(BROADCAST, NotificationKind::CycleSummary, json!({})))
            .await;
        assert!(matches!(result, Err(Error::Notify(_))));

        // publish swallows the failure
        publish(
            &notifier,
            Notification::new(BROADCAST, NotificationKind::CycleSummary, json!({})),
        )
        .await;
    }

    #[tokio::test]
    async fn test_tracing_notifier() {
        let notifier = TracingNotifier;
        let n = Notification::new("rust_agent", NotificationKind::TrainingFeedback, json!({}));
        assert!(notifier.notify(&n).await.is_ok());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let value = serde_json::to_value(NotificationKind::TrainingRecommendation).unwrap();
        assert_eq!(value, json!("training_recommendation"));
    }
}
