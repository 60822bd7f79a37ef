use async_trait::async_trait;
use crate::error::Error;
use crate::models::ClassScores;

/// The opaque pretrained sentiment model.
///
/// Implementations score a batch of already-validated, already-truncated texts
/// and return one [`ClassScores`] per input, in input order. Any failure to run
/// the model should be reported as [`Error::ClassifierUnavailable`].
#[async_trait]
pub trait SentimentModel: Send + Sync {
    /// Identifier stored alongside every classification for auditing.
    fn model_id(&self) -> &str;

    /// Longest input, in whitespace-delimited tokens, the model accepts.
    fn max_input_tokens(&self) -> usize {
        512
    }

    async fn predict(&self, texts: &[String]) -> Result<Vec<ClassScores>, Error>;
}
