// ================================================================
// File: moodmeter-common/src/error.rs
// ================================================================

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found error: {0}")]
    NotFound(String),

    // Pipeline taxonomy:
    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Duplicate classification for message {0}")]
    DuplicateClassification(Uuid),

    #[error("Duplicate message for external id '{0}'")]
    DuplicateMessage(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Ambient variants:
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Uuid error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("Event bus error: {0}")]
    EventBus(String),
}

impl Error {
    /// True for conditions that clear up on their own and should be retried
    /// with backoff rather than surfaced.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ClassifierUnavailable(_) | Error::StoreUnavailable(_) | Error::Timeout(_)
        )
    }

    /// Duplicate writes are the expected outcome of at-least-once delivery.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Error::DuplicateClassification(_) | Error::DuplicateMessage(_)
        )
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<chrono::format::ParseError> for Error {
    fn from(err: chrono::format::ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_duplicate_classes_do_not_overlap() {
        let transient = [
            Error::ClassifierUnavailable("oom".into()),
            Error::StoreUnavailable("pool closed".into()),
        ];
        for e in &transient {
            assert!(e.is_transient(), "{e} should be transient");
            assert!(!e.is_duplicate());
        }

        let dup = Error::DuplicateClassification(Uuid::new_v4());
        assert!(dup.is_duplicate());
        assert!(!dup.is_transient());

        let bad = Error::InvalidInput("empty text".into());
        assert!(!bad.is_transient());
        assert!(!bad.is_duplicate());
    }
}
