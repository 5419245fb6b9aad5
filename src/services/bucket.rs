//! Time-bucket derivation for grouping photos by capture date.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Granularity of the time grouping applied to a run's photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketGranularity {
    Day,
    Week,
    Month,
    Year,
}

impl fmt::Display for BucketGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BucketGranularity::Day => "day",
            BucketGranularity::Week => "week",
            BucketGranularity::Month => "month",
            BucketGranularity::Year => "year",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("Unsupported bucket granularity: {0}")]
    InvalidBucket(String),
}

impl FromStr for BucketGranularity {
    type Err = BucketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(BucketGranularity::Day),
            "week" => Ok(BucketGranularity::Week),
            "month" => Ok(BucketGranularity::Month),
            "year" => Ok(BucketGranularity::Year),
            other => Err(BucketError::InvalidBucket(other.to_string())),
        }
    }
}

/// A derived bucket: stable sort-friendly key plus a human label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub key: String,
    pub label: String,
}

/// Derive the bucket key and label for a capture timestamp.
///
/// Week keys follow the ISO-8601 week-numbering rule (the week containing
/// the year's first Thursday), so a January date can land in the previous
/// ISO year.
pub fn derive_bucket(timestamp: NaiveDateTime, granularity: BucketGranularity) -> Bucket {
    match granularity {
        BucketGranularity::Day => Bucket {
            key: timestamp.format("%Y-%m-%d").to_string(),
            label: timestamp.format("%b %d, %Y").to_string(),
        },
        BucketGranularity::Week => {
            let iso = timestamp.date().iso_week();
            Bucket {
                key: format!("{}-W{:02}", iso.year(), iso.week()),
                label: format!("Week {} {}", iso.week(), iso.year()),
            }
        }
        BucketGranularity::Month => Bucket {
            key: timestamp.format("%Y-%m").to_string(),
            label: timestamp.format("%B %Y").to_string(),
        },
        BucketGranularity::Year => {
            let key = timestamp.format("%Y").to_string();
            Bucket {
                label: key.clone(),
                key,
            }
        }
    }
}

/// Map a bucket key onto a tuple that sorts chronologically.
///
/// Day keys order by `(year*100 + month, day)` and month keys by
/// `(year, month)`, which keeps them interleaved correctly within the same
/// year; week keys order by `(year, week)`; year keys by `(year, 0)`.
pub fn bucket_sort_key(bucket_key: &str) -> (i64, i64) {
    if let Some((year, week)) = bucket_key.split_once("-W") {
        return (
            year.parse().unwrap_or_default(),
            week.parse().unwrap_or_default(),
        );
    }
    let parts: Vec<i64> = bucket_key
        .split('-')
        .map(|p| p.parse().unwrap_or_default())
        .collect();
    match parts.as_slice() {
        [year, month, day] => (year * 100 + month, *day),
        [year, month] => (*year, *month),
        [year] => (*year, 0),
        _ => (0, 0),
    }
}
