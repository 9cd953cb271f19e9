use async_trait::async_trait;
use voyago_shared::pii::Masked;

/// A rendered notification ready for dispatch.
#[derive(Debug, Clone)]
pub struct Notification {
    pub to: Masked<String>,
    pub subject: String,
    pub body: String,
}

/// One-way, fire-and-forget dispatch seam. The engine builds payloads and
/// hands them off; delivery (templating service, mail provider) is an
/// external collaborator. Implementations must not fail the calling flow.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn dispatch(&self, notification: Notification);
}
