// File: moodmeter-core/tests/model_mock_tests.rs

use std::sync::Arc;
use async_trait::async_trait;
use mockall::mock;

use moodmeter_common::models::{ClassScores, SentimentLabel};
use moodmeter_common::traits::SentimentModel;
use moodmeter_core::classifier::ClassifierAdapter;
use moodmeter_core::Error;

mock! {
    Model {}
    #[async_trait]
    impl SentimentModel for Model {
        fn model_id(&self) -> &str;
        async fn predict(&self, texts: &[String]) -> Result<Vec<ClassScores>, Error>;
    }
}

#[tokio::test]
async fn test_adapter_sends_truncated_text_once() -> Result<(), Error> {
    let mut model = MockModel::new();
    model.expect_model_id().return_const("mock-v1".to_string());
    model
        .expect_predict()
        .withf(|texts| texts.len() == 2 && texts[0] == "one two" && texts[1] == "four")
        .times(1)
        .returning(|texts| Ok(vec![ClassScores::new(0.2, 0.1, 0.7); texts.len()]));

    let adapter = ClassifierAdapter::new(Arc::new(model)).with_max_input_tokens(2);
    let results = adapter
        .classify_batch(&["one two three".to_string(), "   ".to_string(), "  four ".to_string()])
        .await?;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().map(|p| p.label).ok(), Some(SentimentLabel::Negative));
    assert!(matches!(results[1], Err(Error::InvalidInput(_))));
    assert!(results[2].is_ok());
    Ok(())
}

#[tokio::test]
async fn test_all_invalid_batch_never_calls_model() -> Result<(), Error> {
    let mut model = MockModel::new();
    model.expect_model_id().return_const("mock-v1".to_string());
    model.expect_predict().never();

    let adapter = ClassifierAdapter::new(Arc::new(model));
    let results = adapter.classify_batch(&["".to_string(), "\t".to_string()]).await?;
    assert!(results.iter().all(|r| matches!(r, Err(Error::InvalidInput(_)))));
    Ok(())
}

#[tokio::test]
async fn test_model_failure_is_classifier_unavailable() {
    let mut model = MockModel::new();
    model.expect_model_id().return_const("mock-v1".to_string());
    model
        .expect_predict()
        .times(1)
        .returning(|_| Err(Error::ClassifierUnavailable("503".into())));

    let adapter = ClassifierAdapter::new(Arc::new(model));
    let err = adapter.classify("hello").await.unwrap_err();
    assert!(err.is_transient());
}
