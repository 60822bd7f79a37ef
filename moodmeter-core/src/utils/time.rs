use chrono::{DateTime, Datelike, Duration, DurationRound, TimeZone, Utc};
use moodmeter_common::models::Granularity;

/// Start of the UTC bucket containing `at`. Weeks start Monday 00:00 UTC.
pub fn bucket_start(at: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    match granularity {
        Granularity::Hour => at.duration_trunc(Duration::hours(1)).unwrap_or(at),
        Granularity::Day => day_start(at),
        Granularity::Week => {
            let days_from_monday = at.weekday().num_days_from_monday() as i64;
            day_start(at) - Duration::days(days_from_monday)
        }
    }
}

/// Exclusive end of the bucket starting at `start`.
pub fn bucket_end(start: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    match granularity {
        Granularity::Hour => start + Duration::hours(1),
        Granularity::Day => start + Duration::days(1),
        Granularity::Week => start + Duration::weeks(1),
    }
}

fn day_start(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&at.date_naive().and_time(chrono::NaiveTime::MIN))
}
