// File: moodmeter-core/src/classifier/mod.rs

pub mod adapter;
pub mod http_model;
pub mod lexicon;

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use moodmeter_common::traits::SentimentModel;
use crate::Error;

pub use adapter::{ClassifierAdapter, prepare_input, select_label, truncate_to_tokens};
pub use http_model::HttpModel;
pub use lexicon::LexiconModel;

/// Which model backs the adapter.
#[derive(Debug, Clone)]
pub enum ModelBackend {
    Lexicon,
    Http {
        endpoint: String,
        model_id: String,
        api_token: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub backend: ModelBackend,
    pub max_input_tokens: usize,
    pub request_timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::Lexicon,
            max_input_tokens: 512,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Builds the adapter described by `config`.
pub fn build_classifier(config: &ClassifierConfig) -> Result<ClassifierAdapter, Error> {
    let model: Arc<dyn SentimentModel> = match &config.backend {
        ModelBackend::Lexicon => {
            Arc::new(LexiconModel::new().with_max_input_tokens(config.max_input_tokens))
        }
        ModelBackend::Http { endpoint, model_id, api_token } => Arc::new(
            HttpModel::new(endpoint, model_id, api_token.clone(), config.request_timeout)?
                .with_max_input_tokens(config.max_input_tokens),
        ),
    };
    info!(
        "Classifier ready: model_id='{}', max_input_tokens={}",
        model.model_id(),
        config.max_input_tokens
    );
    Ok(ClassifierAdapter::new(model))
}
