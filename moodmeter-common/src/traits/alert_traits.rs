use async_trait::async_trait;
use crate::error::Error;
use crate::models::Alert;

/// The external notification channel.
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, alert: &Alert) -> Result<(), Error>;
}
