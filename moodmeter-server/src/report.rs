//! moodmeter-server/src/report.rs
//!
//! Report mode: prints the current window and trend for one chat as JSON.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use moodmeter_common::models::Granularity;
use moodmeter_core::services::AggregationEngine;
use moodmeter_core::Error;

use crate::context::{aggregation_config, open_store};
use crate::Args;

pub async fn run_report(args: Args) -> Result<(), Error> {
    let chat_id = args
        .chat_id
        .ok_or_else(|| Error::Config("--chat-id is required in report mode".into()))?;
    let granularity: Granularity = args.granularity.parse()?;

    let store = open_store(&args).await?;
    let engine = AggregationEngine::new(store, aggregation_config(&args));

    let (start, end) = report_range(Utc::now(), args.since_hours)?;
    let window = engine.compute_window(chat_id, start, end).await?;
    let trend = engine.compute_trend(chat_id, start, end, granularity).await?;

    let buckets: Vec<_> = trend
        .iter()
        .map(|w| {
            json!({
                "window_start": w.window_start,
                "window_end": w.window_end,
                "positive": w.positive,
                "neutral": w.neutral,
                "negative": w.negative,
                "mean_confidence": w.mean_confidence(),
                "mean_mood": w.mean_mood(),
                "mood_index": w.mood_index(),
            })
        })
        .collect();

    let report = json!({
        "chat_id": chat_id,
        "window": window,
        "negative_share": window.negative_share(),
        "mean_confidence": window.mean_confidence(),
        "mean_mood": window.mean_mood(),
        "mood_index": window.mood_index(),
        "trend": buckets,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// `[end - since_hours, end)`, with at least one hour of history.
fn report_range(end: DateTime<Utc>, since_hours: i64) -> Result<(DateTime<Utc>, DateTime<Utc>), Error> {
    let span = Duration::try_hours(since_hours.max(1))
        .ok_or_else(|| Error::Config(format!("--since-hours {} is out of range", since_hours)))?;
    let start = end
        .checked_sub_signed(span)
        .ok_or_else(|| Error::Config(format!("--since-hours {} reaches before the earliest date", since_hours)))?;
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_range_covers_requested_hours() {
        let end = Utc::now();
        let (start, got_end) = report_range(end, 24).unwrap();
        assert_eq!(got_end, end);
        assert_eq!(end - start, Duration::hours(24));

        let (start, _) = report_range(end, 0).unwrap();
        assert_eq!(end - start, Duration::hours(1));
    }

    #[test]
    fn test_report_range_rejects_huge_spans() {
        let end = Utc::now();
        assert!(matches!(report_range(end, i64::MAX), Err(Error::Config(_))));
        // Representable as a duration, but before the earliest date chrono supports.
        assert!(matches!(report_range(end, 2_500_000_000), Err(Error::Config(_))));
    }
}
