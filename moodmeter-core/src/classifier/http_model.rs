// File: moodmeter-core/src/classifier/http_model.rs
//
// Remote text-classification model reached over HTTP. Speaks the Hugging Face
// inference JSON shape:
//   request:  {"inputs": ["text", ...], "options": {"wait_for_model": true}}
//   response: [[{"label": "POSITIVE", "score": 0.97}, ...], ...]

use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use moodmeter_common::models::{ClassScores, SentimentLabel};
use moodmeter_common::traits::SentimentModel;
use crate::Error;

#[derive(Debug, Clone, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

/// Single-input requests may come back as a flat list instead of a list of lists.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Batch(Vec<Vec<LabelScore>>),
    Single(Vec<LabelScore>),
}

pub struct HttpModel {
    client: Client,
    endpoint: Url,
    api_token: Option<String>,
    model_id: String,
    max_input_tokens: usize,
}

impl HttpModel {
    pub fn new(
        endpoint: &str,
        model_id: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("invalid classifier endpoint '{}': {}", endpoint, e)))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_token,
            model_id: model_id.to_string(),
            max_input_tokens: 512,
        })
    }

    pub fn with_max_input_tokens(mut self, max_input_tokens: usize) -> Self {
        self.max_input_tokens = max_input_tokens;
        self
    }
}

/// Turns the raw response body into one [`ClassScores`] per input.
pub(crate) fn parse_response(body: &str, expected: usize) -> Result<Vec<ClassScores>, Error> {
    let parsed: InferenceResponse = serde_json::from_str(body)
        .map_err(|e| Error::ClassifierUnavailable(format!("unreadable model response: {}", e)))?;

    let rows = match parsed {
        InferenceResponse::Batch(rows) => rows,
        InferenceResponse::Single(row) if expected == 1 => vec![row],
        InferenceResponse::Single(row) => row.into_iter().map(|ls| vec![ls]).collect(),
    };

    Ok(rows
        .into_iter()
        .map(|row| {
            let mut scores = ClassScores::default();
            for ls in row {
                match ls.label.parse::<SentimentLabel>() {
                    Ok(label) => scores.set(label, ls.score),
                    Err(_) => debug!("ignoring unknown model label '{}'", ls.label),
                }
            }
            scores
        })
        .collect())
}

#[async_trait]
impl SentimentModel for HttpModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }

    async fn predict(&self, texts: &[String]) -> Result<Vec<ClassScores>, Error> {
        let mut request = self.client.post(self.endpoint.clone()).json(&json!({
            "inputs": texts,
            "options": { "wait_for_model": true },
        }));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::ClassifierUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::ClassifierUnavailable(format!("reading body failed: {}", e)))?;

        if !status.is_success() {
            warn!("classifier endpoint returned {}: {}", status, body);
            return Err(Error::ClassifierUnavailable(format!("endpoint returned {}", status)));
        }

        parse_response(&body, texts.len())
    }
}
