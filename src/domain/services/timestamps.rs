//! Timestamp parsing and field probing for loosely-typed upstream records.
//!
//! The status API names the same instant differently depending on the
//! record and the platform version. Each semantic timestamp is therefore
//! described by an ordered list of [`FieldExtractor`]s, and the first one
//! yielding a parseable value wins.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];

/// Parse an ISO-8601 timestamp. A trailing `Z` or explicit offset is
/// honoured; a value without zone information is taken as UTC. Anything
/// else yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse a JSON value holding a timestamp string
pub fn parse_timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

/// Reads one named field of a record as a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldExtractor {
    key: &'static str,
}

impl FieldExtractor {
    pub const fn new(key: &'static str) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn extract(&self, record: &Value) -> Option<DateTime<Utc>> {
        record.get(self.key).and_then(parse_timestamp_value)
    }
}

/// Account opening time on the account-detail section
pub const ACCOUNT_CREATED_FIELDS: [FieldExtractor; 4] = [
    FieldExtractor::new("CreationTime"),
    FieldExtractor::new("CreatedAt"),
    FieldExtractor::new("CreateDate"),
    FieldExtractor::new("Time"),
];

/// Time of a monetary transaction
pub const TRANSACTION_TIME_FIELDS: [FieldExtractor; 5] = [
    FieldExtractor::new("CreateDate"),
    FieldExtractor::new("CreatedAt"),
    FieldExtractor::new("Date"),
    FieldExtractor::new("TransactionDate"),
    FieldExtractor::new("Time"),
];

/// Close time of a closed position
pub const POSITION_CLOSE_FIELDS: [FieldExtractor; 6] = [
    FieldExtractor::new("CloseTime"),
    FieldExtractor::new("CloseDate"),
    FieldExtractor::new("CloseDatetime"),
    FieldExtractor::new("CloseAt"),
    FieldExtractor::new("Date"),
    FieldExtractor::new("Time"),
];

/// First extractor that yields a timestamp, in list order
pub fn first_timestamp(record: &Value, extractors: &[FieldExtractor]) -> Option<DateTime<Utc>> {
    extractors.iter().find_map(|e| e.extract(record))
}

/// Earliest per-record timestamp; records without one are skipped
pub fn earliest_timestamp<'a, I>(records: I, extractors: &[FieldExtractor]) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = &'a Value>,
{
    records
        .into_iter()
        .filter_map(|r| first_timestamp(r, extractors))
        .min()
}

/// Latest per-record timestamp; records without one are skipped
pub fn latest_timestamp<'a, I>(records: I, extractors: &[FieldExtractor]) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = &'a Value>,
{
    records
        .into_iter()
        .filter_map(|r| first_timestamp(r, extractors))
        .max()
}
