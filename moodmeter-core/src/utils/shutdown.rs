// File: moodmeter-core/src/utils/shutdown.rs

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// Sleeps for `delay`. Returns true if shutdown was requested before or meanwhile.
pub async fn sleep_or_shutdown(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    if *shutdown_rx.borrow() {
        return true;
    }
    let deadline = Instant::now() + delay;
    loop {
        tokio::select! {
            biased;
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return true;
                }
            },
            _ = sleep_until(deadline) => return false,
        }
    }
}
