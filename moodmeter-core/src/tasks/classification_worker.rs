//! src/tasks/classification_worker.rs
//!
//! Background loop that turns pending messages into classifications.
//! Wakes on ingest notifications or every `poll_interval`, lets a batch fill
//! for up to `max_batch_wait`, then drains. Failures back off and retry;
//! the loop only exits on shutdown.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::eventbus::EventBus;
use crate::services::ingestion_service::{IngestionConfig, IngestionCoordinator};
use crate::utils::{sleep_or_shutdown, Backoff};

pub fn spawn_classification_worker(
    coordinator: Arc<IngestionCoordinator>,
    event_bus: Arc<EventBus>,
) -> JoinHandle<()> {
    let mut shutdown_rx = event_bus.shutdown_rx.clone();
    let notify = coordinator.notifier();
    let cfg = coordinator.config().clone();

    tokio::spawn(async move {
        let mut backoff = Backoff::new(cfg.backoff_base, cfg.backoff_max);
        info!(
            "Classification worker started with batch_size={} poll_interval={:?} max_batch_wait={:?}",
            cfg.batch_size, cfg.poll_interval, cfg.max_batch_wait
        );

        'outer: loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                biased;
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                },
                _ = notify.notified() => {},
                _ = sleep(cfg.poll_interval) => {},
            }

            // Let the batch fill.
            if !cfg.max_batch_wait.is_zero() {
                let deadline = Instant::now() + cfg.max_batch_wait;
                loop {
                    match coordinator.store().count_unclassified().await {
                        Ok(n) if n >= cfg.batch_size as i64 => break,
                        Ok(_) => {}
                        Err(e) => {
                            debug!("backlog count failed while batching: {}", e);
                            break;
                        }
                    }
                    tokio::select! {
                        biased;
                        Ok(_) = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break 'outer;
                            }
                        },
                        _ = notify.notified() => {},
                        _ = sleep_until(deadline) => break,
                    }
                }
            }

            log_backlog(&coordinator, &cfg).await;

            loop {
                if *shutdown_rx.borrow() {
                    break 'outer;
                }
                let failure = match coordinator.run_batch().await {
                    Ok(report) if report.failed == 0 => {
                        backoff.reset();
                        if report.fetched < cfg.batch_size {
                            break;
                        }
                        continue;
                    }
                    Ok(report) => report.last_error.unwrap_or_default(),
                    Err(e) => e.to_string(),
                };

                let delay = backoff.next_delay();
                warn!(
                    "classification batch failed (retry {}): {}; backing off {:?}",
                    backoff.attempt(),
                    failure,
                    delay
                );
                if sleep_or_shutdown(delay, &mut shutdown_rx).await {
                    break 'outer;
                }
            }
        }

        info!("Classification worker exited.");
    })
}

async fn log_backlog(coordinator: &IngestionCoordinator, cfg: &IngestionConfig) {
    match coordinator.store().count_unclassified().await {
        Ok(n) if n > cfg.backlog_warn_threshold => {
            warn!("classification backlog is {} messages (warn threshold {})", n, cfg.backlog_warn_threshold)
        }
        Ok(n) => debug!("classification backlog: {} messages", n),
        Err(e) => debug!("could not read classification backlog: {}", e),
    }
}
