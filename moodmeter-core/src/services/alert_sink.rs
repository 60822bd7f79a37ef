// File: src/services/alert_sink.rs

use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use moodmeter_common::models::Alert;
use moodmeter_common::traits::AlertSink;
use crate::Error;

/// Writes alerts to the log.
#[derive(Debug, Default, Clone)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), Error> {
        match alert {
            Alert::Spike(s) => warn!(
                "ALERT spike: chat={} negative_share={:.3} threshold={:.3} window=[{}, {})",
                s.chat_id, s.negative_share, s.threshold, s.window_start, s.window_end
            ),
            Alert::StuckMessage { message_id, chat_id, attempts, last_error } => warn!(
                "ALERT stuck message: id={} chat={} attempts={} last_error={}",
                message_id, chat_id, attempts, last_error
            ),
            Alert::NegativeMessage { message_id, chat_id, author_id, confidence, .. } => warn!(
                "ALERT negative message: id={} chat={} author={} confidence={:.3}",
                message_id, chat_id, author_id, confidence
            ),
        }
        Ok(())
    }
}

/// POSTs each alert as JSON to a fixed URL.
pub struct WebhookAlertSink {
    client: Client,
    url: Url,
}

impl WebhookAlertSink {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, Error> {
        let url = Url::parse(url)
            .map_err(|e| Error::Config(format!("invalid alert webhook url '{}': {}", url, e)))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), Error> {
        let resp = self.client.post(self.url.clone()).json(alert).send().await?;
        resp.error_for_status()?;
        debug!("delivered {} alert for chat {} to {}", alert.kind(), alert.chat_id(), self.url);
        Ok(())
    }
}
