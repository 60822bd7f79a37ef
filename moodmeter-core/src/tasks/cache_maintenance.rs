// File: moodmeter-core/src/tasks/cache_maintenance.rs

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cache::WindowCache;
use crate::eventbus::EventBus;

/// Spawns a background task that periodically drops tracked windows which
/// ended more than `retention` ago.
pub fn spawn_cache_prune_task(
    cache: Arc<WindowCache>,
    event_bus: Arc<EventBus>,
    interval: Duration,
    retention: Duration,
) -> JoinHandle<()> {
    let mut shutdown_rx = event_bus.shutdown_rx.clone();

    tokio::spawn(async move {
        let retention = match chrono::Duration::from_std(retention) {
            Ok(r) => r,
            Err(e) => {
                warn!("cache retention out of range, pruning disabled: {}", e);
                return;
            }
        };
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
                    let removed = cache.evict_ended_before(Utc::now() - retention);
                    if removed > 0 {
                        debug!("pruned {} expired windows, {} still tracked", removed, cache.tracked_count());
                    }
                }
            }
        }
    })
}
