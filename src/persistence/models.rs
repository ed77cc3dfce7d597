//! Database Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::entities::cycle_report::CycleReport;

/// One row of `cycle_runs`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct CycleRunRecord {
    pub id: i64,
    pub trigger_kind: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub loaded: i64,
    pub published: i64,
    pub retracted: i64,
    pub untouched: i64,
    pub skipped_invalid_id: i64,
    pub status_missing: i64,
    pub write_errors: i64,
    pub error: Option<String>,
}

/// Insert input for `cycle_runs`
#[derive(Debug, Clone)]
pub struct CreateCycleRun {
    pub trigger_kind: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub loaded: i64,
    pub published: i64,
    pub retracted: i64,
    pub untouched: i64,
    pub skipped_invalid_id: i64,
    pub status_missing: i64,
    pub write_errors: i64,
    pub error: Option<String>,
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl From<&CycleReport> for CreateCycleRun {
    fn from(report: &CycleReport) -> Self {
        Self {
            trigger_kind: report.trigger.to_string(),
            started_at: report.started_at,
            finished_at: report.finished_at,
            loaded: count(report.loaded),
            published: count(report.published),
            retracted: count(report.retracted),
            untouched: count(report.untouched),
            skipped_invalid_id: count(report.skipped_invalid_id),
            status_missing: count(report.status_missing),
            write_errors: count(report.write_errors),
            error: report.error.clone(),
        }
    }
}
