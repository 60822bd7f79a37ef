// File: moodmeter-common/src/models/mod.rs
pub mod sentiment;
pub mod message;
pub mod classification;
pub mod aggregate;
pub mod alert;

pub use sentiment::{ClassScores, Prediction, SentimentLabel};
pub use message::{InboundEvent, Inserted, Message, MessageStatus, UnclassifiableMessage};
pub use classification::{Classification, NewClassification};
pub use aggregate::{AggregateWindow, Granularity};
pub use alert::{Alert, SpikeAlert};
