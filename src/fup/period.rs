//! Accounting periods for fair-use policies.
//!
//! Each period maps an instant to a canonical bucket key and knows when the
//! current bucket ends. Two instants share a bucket iff their keys are equal;
//! the reset instant feeds the `Retry-After` header.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// A named accounting bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

/// All periods, in checking order.
pub const PERIODS: [Period; 5] =
    [Period::Minutely, Period::Hourly, Period::Daily, Period::Weekly, Period::Monthly];

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Minutely => "minutely",
            Period::Hourly => "hourly",
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }

    /// Canonical key identifying the bucket `t` falls into (UTC). The weekly
    /// key uses the ISO year and ISO week so year boundaries bucket
    /// correctly.
    pub fn bucket_key(&self, t: DateTime<Utc>) -> String {
        match self {
            Period::Minutely => t.format("%Y-%m-%d-%H-%M").to_string(),
            Period::Hourly => t.format("%Y-%m-%d-%H").to_string(),
            Period::Daily => t.format("%Y-%m-%d").to_string(),
            Period::Weekly => format!("{}-{:02}", t.iso_week().year(), t.iso_week().week()),
            Period::Monthly => t.format("%Y-%m").to_string(),
        }
    }

    /// The instant the bucket containing `now` ends.
    pub fn reset_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = |date: chrono::NaiveDate| {
            Utc.with_ymd_and_hms(date.year(), date.month(), date.day(), 0, 0, 0)
                .single()
                .expect("valid calendar date")
        };
        match self {
            Period::Minutely => {
                let truncated = now.with_second(0).and_then(|t| t.with_nanosecond(0));
                truncated.expect("valid time components") + Duration::minutes(1)
            }
            Period::Hourly => {
                let truncated = now
                    .with_minute(0)
                    .and_then(|t| t.with_second(0))
                    .and_then(|t| t.with_nanosecond(0));
                truncated.expect("valid time components") + Duration::hours(1)
            }
            Period::Daily => midnight(now.date_naive() + Duration::days(1)),
            Period::Weekly => {
                let until_monday = 7 - i64::from(now.weekday().num_days_from_monday());
                midnight(now.date_naive() + Duration::days(until_monday))
            }
            Period::Monthly => {
                let (year, month) = if now.month() == 12 {
                    (now.year() + 1, 1)
                } else {
                    (now.year(), now.month() + 1)
                };
                Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
                    .single()
                    .expect("valid calendar date")
            }
        }
    }
}
