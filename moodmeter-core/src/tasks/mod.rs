pub mod alert_forwarder;
pub mod cache_maintenance;
pub mod classification_worker;
pub mod spike_monitor;

pub use alert_forwarder::spawn_alert_forwarder;
pub use cache_maintenance::spawn_cache_prune_task;
pub use classification_worker::spawn_classification_worker;
pub use spike_monitor::spawn_spike_monitor;
