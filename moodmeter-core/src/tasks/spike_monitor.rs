// File: moodmeter-core/src/tasks/spike_monitor.rs

use std::sync::Arc;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use moodmeter_common::models::Alert;
use crate::eventbus::EventBus;
use crate::services::aggregation_service::AggregationEngine;

/// Spawns a background task that periodically checks every active chat's
/// trailing window for a negative spike and publishes what it finds.
pub fn spawn_spike_monitor(engine: Arc<AggregationEngine>, event_bus: Arc<EventBus>) -> JoinHandle<()> {
    let mut shutdown_rx = event_bus.shutdown_rx.clone();
    let interval = engine.config().spike_check_interval;

    tokio::spawn(async move {
        info!(
            "Spike monitor started: window={:?} interval={:?} threshold={}",
            engine.config().spike_window,
            interval,
            engine.config().spike_threshold
        );
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                biased;
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                },
                _ = sleep(interval) => {
                    match engine.check_spikes(Utc::now()).await {
                        Ok(alerts) => {
                            for alert in alerts {
                                event_bus.publish_alert(Alert::Spike(alert)).await;
                            }
                        }
                        Err(e) => warn!("spike check failed: {}", e),
                    }
                }
            }
        }
        info!("Spike monitor exited.");
    })
}
