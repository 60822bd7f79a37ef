//! moodmeter-server/src/server.rs
//!
//! Server mode: reads inbound events as JSON lines from stdin and runs the
//! classification worker, spike monitor and alert forwarder until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time;
use tracing::{debug, error, info, warn};

use moodmeter_common::models::InboundEvent;
use moodmeter_core::eventbus::{EventBus, MoodEvent};
use moodmeter_core::services::IngestionCoordinator;
use moodmeter_core::tasks::{spawn_alert_forwarder, spawn_classification_worker, spawn_spike_monitor};
use moodmeter_core::Error;

use crate::context::ServerContext;
use crate::Args;

pub async fn run_server(args: Args) -> Result<(), Error> {
    let ctx = ServerContext::new(&args).await?;
    let event_bus = ctx.event_bus.clone();

    // 1) Background tasks
    let forwarder = spawn_alert_forwarder(event_bus.clone(), ctx.sinks.clone()).await;
    let worker = spawn_classification_worker(ctx.coordinator.clone(), event_bus.clone());
    let monitor = spawn_spike_monitor(ctx.engine.clone(), event_bus.clone());

    // 2) Inbound events
    let reader = tokio::spawn(read_stdin(ctx.coordinator.clone(), event_bus.clone(), args.exit_on_eof));

    // Ctrl-C => signal
    let eb_for_ctrlc = event_bus.clone();
    let _ctrlc_handle = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
            return;
        }
        info!("Ctrl-C detected; shutting down event bus...");
        eb_for_ctrlc.shutdown();
    });

    // 3) Main loop => send Tick events until we see shutdown
    let mut shutdown_rx = event_bus.shutdown_rx.clone();
    loop {
        tokio::select! {
            _ = time::sleep(Duration::from_secs(10)) => {
                event_bus.publish(MoodEvent::Tick).await;
            }
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Shutdown signaled; exiting server loop.");
                    break;
                }
            }
        }
    }

    reader.abort();
    for (name, handle) in [
        ("worker", worker),
        ("spike monitor", monitor),
        ("alert forwarder", forwarder),
    ] {
        if let Err(e) = handle.await {
            error!("{} task ended abnormally: {:?}", name, e);
        }
    }
    match ctx.store.count_unclassified().await {
        Ok(0) => info!("Server shutdown complete."),
        Ok(n) => info!("Server shutdown complete; {} messages left pending for the next run.", n),
        Err(e) => warn!("Server shutdown complete; backlog unknown: {}", e),
    }
    Ok(())
}

async fn read_stdin(coordinator: Arc<IngestionCoordinator>, event_bus: Arc<EventBus>, exit_on_eof: bool) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut accepted = 0u64;
    let mut rejected = 0u64;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<InboundEvent>(line) {
                    Ok(event) => match coordinator.ingest(&event).await {
                        Ok(_) => accepted += 1,
                        Err(e) => {
                            rejected += 1;
                            error!("event '{}' not stored: {}", event.external_id, e);
                        }
                    },
                    Err(e) => {
                        rejected += 1;
                        warn!("skipping malformed event line: {}", e);
                        debug!("malformed line: {}", line);
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("stdin read failed: {}", e);
                break;
            }
        }
    }

    info!("stdin closed after {} accepted and {} rejected events.", accepted, rejected);
    if exit_on_eof {
        wait_for_backlog(&coordinator).await;
        event_bus.shutdown();
    }
}

async fn wait_for_backlog(coordinator: &IngestionCoordinator) {
    let store = coordinator.store();
    loop {
        match store.count_unclassified().await {
            Ok(0) => return,
            Ok(n) => debug!("waiting for {} pending messages", n),
            Err(e) => {
                warn!("cannot read backlog while draining: {}", e);
                return;
            }
        }
        time::sleep(Duration::from_millis(250)).await;
    }
}
