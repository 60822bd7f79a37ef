// File: moodmeter-core/src/services/mod.rs

pub mod aggregation_service;
pub mod alert_sink;
pub mod ingestion_service;
pub mod spike_detector;

pub use aggregation_service::{AggregationConfig, AggregationEngine};
pub use alert_sink::{LogAlertSink, WebhookAlertSink};
pub use ingestion_service::{BatchReport, IngestionConfig, IngestionCoordinator};
pub use spike_detector::SpikeDetector;
