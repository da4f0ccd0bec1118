//! Notifier trait definition and shared error types.

use std::collections::HashMap;

use repowatch_core::SubscriberId;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Delivery rejected: {0}")]
    Rejected(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

/// A rendered notification ready for delivery to one subscriber.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    /// Subscriber (chat) the message is addressed to.
    pub recipient: SubscriberId,
    /// The rendered message text.
    pub body: String,
    /// Additional metadata (label, revision, repository).
    pub metadata: HashMap<String, String>,
}

impl Notification {
    pub fn new(recipient: SubscriberId, body: impl Into<String>) -> Self {
        Self {
            recipient,
            body: body.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Test connectivity with a sample notification to `recipient`.
    async fn test(&self, recipient: &SubscriberId) -> Result<(), NotifyError> {
        let mut notification = Notification::new(
            recipient.clone(),
            "This is a test notification from repowatch.",
        );
        notification
            .metadata
            .insert("label".to_string(), "test".to_string());
        self.send(&notification).await
    }

    /// Human-readable name for this channel (e.g., "telegram", "webhook").
    fn channel_name(&self) -> &str;
}
