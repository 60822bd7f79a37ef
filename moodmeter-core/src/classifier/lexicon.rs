//! # Lexicon model
//!
//! Deterministic in-process sentiment model: word weights with negation and
//! intensifier handling, turned into class probabilities with a softmax.

use std::collections::HashMap;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use moodmeter_common::models::ClassScores;
use moodmeter_common::traits::SentimentModel;
use crate::Error;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}']+").expect("token pattern is valid"));

/// How far a negation word reaches forward, in tokens.
const NEGATION_SCOPE: u8 = 2;
/// Logit multiplier applied to the accumulated positive/negative mass.
const MASS_SCALE: f64 = 3.0;
/// Constant logit of the neutral class.
const NEUTRAL_BIAS: f64 = 0.5;

pub struct LexiconModel {
    model_id: String,
    words: HashMap<String, f64>,
    negations: Vec<String>,
    intensifiers: HashMap<String, f64>,
    max_input_tokens: usize,
}

impl Default for LexiconModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconModel {
    pub fn new() -> Self {
        let mut words = HashMap::new();

        let positive_words = [
            ("great", 0.8),
            ("good", 0.6),
            ("excellent", 0.9),
            ("awesome", 0.9),
            ("amazing", 0.9),
            ("fantastic", 0.9),
            ("wonderful", 0.9),
            ("perfect", 0.9),
            ("best", 0.8),
            ("love", 0.8),
            ("happy", 0.7),
            ("glad", 0.6),
            ("helpful", 0.6),
            ("thanks", 0.5),
            ("thank", 0.5),
            ("nice", 0.5),
            ("cool", 0.5),
            ("like", 0.4),
            ("fine", 0.3),
            ("fast", 0.3),
            ("отлично", 0.9),
            ("супер", 0.8),
            ("хорошо", 0.6),
            ("спасибо", 0.5),
        ];

        let negative_words = [
            ("terrible", -0.9),
            ("awful", -0.9),
            ("horrible", -0.9),
            ("worst", -0.9),
            ("hate", -0.9),
            ("scam", -0.9),
            ("useless", -0.8),
            ("bad", -0.7),
            ("angry", -0.7),
            ("rude", -0.7),
            ("disappointed", -0.7),
            ("sad", -0.6),
            ("poor", -0.6),
            ("broken", -0.6),
            ("annoying", -0.6),
            ("fail", -0.6),
            ("failed", -0.6),
            ("wrong", -0.5),
            ("slow", -0.4),
            ("problem", -0.4),
            ("bug", -0.4),
            ("refund", -0.3),
            ("ужасно", -0.9),
            ("отвратительно", -0.9),
            ("плохо", -0.7),
        ];

        for (word, score) in positive_words.into_iter().chain(negative_words) {
            words.insert(word.to_string(), score);
        }

        let negations = [
            "not", "no", "never", "don't", "doesn't", "isn't", "wasn't", "aren't",
            "can't", "won't", "didn't", "не", "нет",
        ]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let intensifiers = [("very", 1.5), ("really", 1.3), ("extremely", 1.8), ("so", 1.2), ("очень", 1.5)]
            .into_iter()
            .map(|(w, m)| (w.to_string(), m))
            .collect();

        Self {
            model_id: "lexicon-v1".to_string(),
            words,
            negations,
            intensifiers,
            max_input_tokens: 512,
        }
    }

    pub fn with_max_input_tokens(mut self, max_input_tokens: usize) -> Self {
        self.max_input_tokens = max_input_tokens;
        self
    }

    /// Scores one text. Pure function of the text and the lexicon.
    pub fn score(&self, text: &str) -> ClassScores {
        let lowered = text.to_lowercase();
        let mut positive_mass = 0.0;
        let mut negative_mass = 0.0;
        let mut negate_left = 0u8;
        let mut multiplier = 1.0;

        for token in TOKEN_RE.find_iter(&lowered).map(|m| m.as_str()) {
            if self.negations.iter().any(|n| n == token) {
                negate_left = NEGATION_SCOPE;
                continue;
            }
            if let Some(m) = self.intensifiers.get(token) {
                multiplier = *m;
                continue;
            }

            if let Some(weight) = self.words.get(token) {
                let mut w = weight * multiplier;
                if negate_left > 0 {
                    w = -w;
                    negate_left = 0;
                }
                if w > 0.0 {
                    positive_mass += w;
                } else {
                    negative_mass += -w;
                }
            } else {
                negate_left = negate_left.saturating_sub(1);
            }
            multiplier = 1.0;
        }

        softmax(MASS_SCALE * positive_mass, NEUTRAL_BIAS, MASS_SCALE * negative_mass)
    }
}

fn softmax(positive: f64, neutral: f64, negative: f64) -> ClassScores {
    let max = positive.max(neutral).max(negative);
    let (p, n, g) = ((positive - max).exp(), (neutral - max).exp(), (negative - max).exp());
    let sum = p + n + g;
    ClassScores::new(p / sum, n / sum, g / sum)
}

#[async_trait]
impl SentimentModel for LexiconModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }

    async fn predict(&self, texts: &[String]) -> Result<Vec<ClassScores>, Error> {
        Ok(texts.iter().map(|t| self.score(t)).collect())
    }
}
