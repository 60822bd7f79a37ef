//! src/classifier/adapter.rs
//!
//! Stable `text -> (label, confidence)` interface over an opaque [`SentimentModel`].
//!
//! Input policy:
//!  - text is trimmed; empty text is `InvalidInput` for that item only.
//!  - text is cut to the first `max_input_tokens` whitespace-delimited tokens and
//!    at most `max_input_tokens * MAX_CHARS_PER_TOKEN` characters. The kept prefix
//!    is a slice of the original, never re-joined.
//!
//! Output policy: argmax over class probabilities; exact ties resolve in
//! [`SentimentLabel::TIE_BREAK_ORDER`] (neutral, positive, negative).

use std::sync::Arc;
use tracing::{debug, trace};

use moodmeter_common::models::{ClassScores, Prediction, SentimentLabel};
use moodmeter_common::traits::SentimentModel;
use crate::Error;

/// Hard character cap per allowed token, for inputs with very long "words".
pub const MAX_CHARS_PER_TOKEN: usize = 32;

#[derive(Clone)]
pub struct ClassifierAdapter {
    model: Arc<dyn SentimentModel>,
    max_input_tokens: usize,
}

impl ClassifierAdapter {
    pub fn new(model: Arc<dyn SentimentModel>) -> Self {
        let max_input_tokens = model.max_input_tokens().max(1);
        Self { model, max_input_tokens }
    }

    /// Overrides the model's own limit; never raises it above what the model accepts.
    pub fn with_max_input_tokens(mut self, max_input_tokens: usize) -> Self {
        self.max_input_tokens = max_input_tokens.clamp(1, self.model.max_input_tokens().max(1));
        self
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }

    /// Classifies a single text.
    pub async fn classify(&self, text: &str) -> Result<Prediction, Error> {
        let mut results = self.classify_batch(&[text.to_string()]).await?;
        results
            .pop()
            .unwrap_or_else(|| Err(Error::ClassifierUnavailable("model returned no result".into())))
    }

    /// Classifies many texts in one model invocation.
    ///
    /// The outer error means the whole batch could not be run. Inner errors are
    /// per-item (`InvalidInput`) and never stop the rest of the batch.
    /// Results are in input order.
    pub async fn classify_batch(
        &self,
        texts: &[String],
    ) -> Result<Vec<Result<Prediction, Error>>, Error> {
        let mut prepared: Vec<String> = Vec::with_capacity(texts.len());
        let mut slots: Vec<Result<usize, Error>> = Vec::with_capacity(texts.len());

        for text in texts {
            match prepare_input(text, self.max_input_tokens) {
                Ok(input) => {
                    slots.push(Ok(prepared.len()));
                    prepared.push(input.to_string());
                }
                Err(e) => slots.push(Err(e)),
            }
        }

        let scores = if prepared.is_empty() {
            Vec::new()
        } else {
            trace!("invoking model '{}' on {} texts", self.model.model_id(), prepared.len());
            self.model.predict(&prepared).await?
        };

        if scores.len() != prepared.len() {
            return Err(Error::ClassifierUnavailable(format!(
                "model '{}' returned {} results for {} inputs",
                self.model.model_id(),
                scores.len(),
                prepared.len()
            )));
        }

        Ok(slots
            .into_iter()
            .map(|slot| slot.map(|idx| select_label(&scores[idx])))
            .collect())
    }
}

/// Validates and truncates one input text.
pub fn prepare_input(text: &str, max_input_tokens: usize) -> Result<&str, Error> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("message text is empty".into()));
    }
    let truncated = truncate_to_tokens(trimmed, max_input_tokens);
    let truncated = truncate_to_chars(truncated, max_input_tokens.saturating_mul(MAX_CHARS_PER_TOKEN));
    if truncated.len() < trimmed.len() {
        debug!("truncated input from {} to {} bytes", trimmed.len(), truncated.len());
    }
    Ok(truncated)
}

/// Keeps the first `max_tokens` whitespace-delimited tokens of `text`.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> &str {
    let mut tokens = 0usize;
    let mut in_token = false;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_token && tokens == max_tokens {
                return &text[..idx];
            }
            in_token = false;
        } else if !in_token {
            in_token = true;
            tokens += 1;
        }
    }
    text
}

fn truncate_to_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Argmax with the fixed tie-break order. Non-finite and negative scores count as zero;
/// confidence is the winner's share of the total mass.
pub fn select_label(scores: &ClassScores) -> Prediction {
    let clean = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };

    let mut best = SentimentLabel::TIE_BREAK_ORDER[0];
    let mut best_score = clean(scores.get(best));
    let mut total = best_score;
    for label in SentimentLabel::TIE_BREAK_ORDER.iter().skip(1) {
        let s = clean(scores.get(*label));
        total += s;
        if s > best_score {
            best = *label;
            best_score = s;
        }
    }

    let confidence = if total > 0.0 {
        (best_score / total).clamp(0.0, 1.0)
    } else {
        0.0
    };
    Prediction { label: best, confidence }
}
