//! moodmeter-server/src/context.rs
//!
//! Builds the shared pieces (store, event bus, coordinator, aggregation engine)
//! from command-line arguments.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use moodmeter_common::traits::{AlertSink, MessageStore};
use moodmeter_core::classifier::{build_classifier, ClassifierConfig, ModelBackend};
use moodmeter_core::db::Database;
use moodmeter_core::eventbus::EventBus;
use moodmeter_core::repositories::{InMemoryMessageStore, PostgresMessageStore};
use moodmeter_core::services::{
    AggregationConfig, AggregationEngine, IngestionConfig, IngestionCoordinator, LogAlertSink,
    WebhookAlertSink,
};
use moodmeter_core::Error;

use crate::Args;

pub struct ServerContext {
    pub store: Arc<dyn MessageStore>,
    pub event_bus: Arc<EventBus>,
    pub coordinator: Arc<IngestionCoordinator>,
    pub engine: Arc<AggregationEngine>,
    pub sinks: Vec<Arc<dyn AlertSink>>,
}

impl ServerContext {
    pub async fn new(args: &Args) -> Result<Self, Error> {
        let store = open_store(args).await?;
        let event_bus = Arc::new(EventBus::new());

        let classifier = build_classifier(&classifier_config(args)?)?;
        // Spike checks and reports read full recomputes; the window cache stays unwired.
        let engine = Arc::new(AggregationEngine::new(store.clone(), aggregation_config(args)));
        let coordinator = Arc::new(IngestionCoordinator::new(
            store.clone(),
            classifier,
            event_bus.clone(),
            ingestion_config(args),
        ));

        let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogAlertSink)];
        if let Some(url) = &args.alert_webhook {
            sinks.push(Arc::new(WebhookAlertSink::new(url, Duration::from_secs(10))?));
            info!("Alerts will also be POSTed to {}", url);
        }

        Ok(Self { store, event_bus, coordinator, engine, sinks })
    }
}

pub async fn open_store(args: &Args) -> Result<Arc<dyn MessageStore>, Error> {
    match args.store.as_str() {
        "postgres" => {
            info!("Using Postgres store.");
            let db = Database::with_max_connections(&args.database_url, args.db_max_connections).await?;
            db.migrate().await?;
            Ok(Arc::new(PostgresMessageStore::new(db.pool().clone())))
        }
        "memory" => {
            info!("Using in-memory store; nothing survives a restart.");
            Ok(Arc::new(InMemoryMessageStore::new()))
        }
        other => Err(Error::Config(format!("unknown store '{}'; use postgres or memory", other))),
    }
}

fn classifier_config(args: &Args) -> Result<ClassifierConfig, Error> {
    let backend = match args.classifier.as_str() {
        "lexicon" => ModelBackend::Lexicon,
        "http" => ModelBackend::Http {
            endpoint: args
                .model_endpoint
                .clone()
                .ok_or_else(|| Error::Config("--model-endpoint is required for the http classifier".into()))?,
            model_id: args.model_id.clone(),
            api_token: args.model_api_token.clone(),
        },
        other => return Err(Error::Config(format!("unknown classifier '{}'; use lexicon or http", other))),
    };
    Ok(ClassifierConfig {
        backend,
        max_input_tokens: args.max_input_tokens,
        request_timeout: Duration::from_secs(args.classify_timeout_secs),
    })
}

fn ingestion_config(args: &Args) -> IngestionConfig {
    IngestionConfig {
        batch_size: args.batch_size.max(1),
        max_batch_wait: Duration::from_millis(args.max_batch_wait_ms),
        poll_interval: Duration::from_secs(args.poll_interval_secs.max(1)),
        classify_timeout: Duration::from_secs(args.classify_timeout_secs),
        retry_ceiling: args.retry_ceiling,
        negative_message_threshold: (!args.no_negative_message_alerts)
            .then_some(args.negative_message_threshold),
        backlog_warn_threshold: args.backlog_warn_threshold,
        ..Default::default()
    }
}

pub fn aggregation_config(args: &Args) -> AggregationConfig {
    AggregationConfig {
        spike_threshold: args.spike_threshold,
        min_messages: args.spike_min_messages,
        spike_window: Duration::from_secs(args.spike_window_secs),
        spike_check_interval: Duration::from_secs(args.spike_check_interval_secs.max(1)),
    }
}
