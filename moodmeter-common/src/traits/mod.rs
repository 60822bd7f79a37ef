pub mod repository_traits;
pub mod model_traits;
pub mod alert_traits;

pub use repository_traits::MessageStore;
pub use model_traits::SentimentModel;
pub use alert_traits::AlertSink;
