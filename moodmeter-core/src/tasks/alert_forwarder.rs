// File: moodmeter-core/src/tasks/alert_forwarder.rs

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use moodmeter_common::models::Alert;
use moodmeter_common::traits::AlertSink;
use crate::eventbus::{EventBus, MoodEvent};

/// Subscribes to the bus and hands every alert to each sink.
/// The subscription exists before this returns, so no alert published
/// afterwards is missed. Alerts already queued at shutdown are still delivered.
pub async fn spawn_alert_forwarder(
    event_bus: Arc<EventBus>,
    sinks: Vec<Arc<dyn AlertSink>>,
) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe(None).await;
    let mut shutdown_rx = event_bus.shutdown_rx.clone();

    tokio::spawn(async move {
        info!("Alert forwarder started with {} sink(s).", sinks.len());
        loop {
            tokio::select! {
                biased;
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(MoodEvent::Alert(alert)) => forward(&sinks, &alert).await,
                        Some(_) => {}
                        None => break,
                    }
                },
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                },
            }
        }

        while let Ok(event) = rx.try_recv() {
            if let MoodEvent::Alert(alert) = event {
                forward(&sinks, &alert).await;
            }
        }
        info!("Alert forwarder exited.");
    })
}

async fn forward(sinks: &[Arc<dyn AlertSink>], alert: &Alert) {
    for sink in sinks {
        match sink.deliver(alert).await {
            Ok(()) => debug!("alert {} for chat {} sent to '{}'", alert.kind(), alert.chat_id(), sink.name()),
            Err(e) => warn!("sink '{}' failed to deliver {} alert: {}", sink.name(), alert.kind(), e),
        }
    }
}
