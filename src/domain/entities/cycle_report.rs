use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::services::schedule::CycleTrigger;

/// Counters and timing of one reconciliation cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    #[serde(serialize_with = "serialize_trigger")]
    pub trigger: CycleTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Ledger rows after exclusion
    pub loaded: usize,
    pub published: usize,
    pub retracted: usize,
    /// Left alone because the status was unavailable and retained
    pub untouched: usize,
    pub skipped_invalid_id: usize,
    /// Accounts for which the status API returned nothing
    pub status_missing: usize,
    /// Upserts or deletes that failed after retries
    pub write_errors: usize,
    /// Set when the cycle aborted before processing accounts
    pub error: Option<String>,
}

fn serialize_trigger<S: serde::Serializer>(trigger: &CycleTrigger, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(trigger)
}

impl CycleReport {
    pub fn new(trigger: CycleTrigger, started_at: DateTime<Utc>) -> Self {
        Self {
            trigger,
            started_at,
            finished_at: started_at,
            loaded: 0,
            published: 0,
            retracted: 0,
            untouched: 0,
            skipped_invalid_id: 0,
            status_missing: 0,
            write_errors: 0,
            error: None,
        }
    }

    /// Report for a cycle that could not load its ledger
    pub fn aborted(trigger: CycleTrigger, started_at: DateTime<Utc>, error: String) -> Self {
        Self {
            finished_at: Utc::now(),
            error: Some(error),
            ..Self::new(trigger, started_at)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn runtime_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
