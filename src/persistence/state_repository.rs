//! Worker State Repository
//!
//! Weekly baseline marker and cycle run history.

use super::models::*;
use super::{DatabaseError, DbPool};
use crate::domain::entities::cycle_report::CycleReport;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, warn};

#[async_trait]
pub trait WorkerStateStore: Send + Sync {
    async fn last_baseline(&self) -> Result<Option<DateTime<Utc>>, DatabaseError>;
    async fn set_last_baseline(&self, at: DateTime<Utc>) -> Result<(), DatabaseError>;
    async fn record_cycle(&self, report: &CycleReport) -> Result<CycleRunRecord, DatabaseError>;
    async fn recent_cycles(&self, limit: i64) -> Result<Vec<CycleRunRecord>, DatabaseError>;
}

/// SQLite implementation of the worker state store
pub struct SqliteStateStore {
    pool: DbPool,
    /// Cycle runs older than this, relative to the newest run, are pruned
    retention: Option<Duration>,
}

impl SqliteStateStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            retention: None,
        }
    }

    /// Keep only the last `days` days of cycle runs. Zero keeps everything.
    pub fn with_retention(mut self, days: u32) -> Self {
        self.retention = (days > 0).then(|| Duration::days(i64::from(days)));
        self
    }

    async fn prune_cycles(&self, newest: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let Some(retention) = self.retention else {
            return Ok(0);
        };
        let result = sqlx::query("DELETE FROM cycle_runs WHERE started_at < ?1")
            .bind(newest - retention)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("Failed to prune cycle runs: {}", e)))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl WorkerStateStore for SqliteStateStore {
    async fn last_baseline(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let row: Option<(Option<DateTime<Utc>>,)> =
            sqlx::query_as("SELECT last_baseline FROM scheduler_state WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!("Failed to read scheduler state: {}", e);
                    DatabaseError::QueryError(format!("Failed to read scheduler state: {}", e))
                })?;

        Ok(row.and_then(|(at,)| at))
    }

    async fn set_last_baseline(&self, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_state (id, last_baseline, updated_at)
            VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                last_baseline = excluded.last_baseline,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save baseline marker: {}", e);
            DatabaseError::QueryError(format!("Failed to save baseline marker: {}", e))
        })?;

        debug!("Baseline marker set to {}", at.to_rfc3339());
        Ok(())
    }

    async fn record_cycle(&self, report: &CycleReport) -> Result<CycleRunRecord, DatabaseError> {
        let run = CreateCycleRun::from(report);
        let record = sqlx::query_as::<_, CycleRunRecord>(
            r#"
            INSERT INTO cycle_runs (
                trigger_kind, started_at, finished_at, loaded, published, retracted,
                untouched, skipped_invalid_id, status_missing, write_errors, error
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING *
            "#,
        )
        .bind(&run.trigger_kind)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.loaded)
        .bind(run.published)
        .bind(run.retracted)
        .bind(run.untouched)
        .bind(run.skipped_invalid_id)
        .bind(run.status_missing)
        .bind(run.write_errors)
        .bind(&run.error)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to record cycle run: {}", e);
            DatabaseError::QueryError(format!("Failed to record cycle run: {}", e))
        })?;

        debug!("Recorded {} cycle run #{}", record.trigger_kind, record.id);

        match self.prune_cycles(record.started_at).await {
            Ok(0) => {}
            Ok(pruned) => debug!("Pruned {} old cycle runs", pruned),
            Err(e) => warn!("{}", e),
        }
        Ok(record)
    }

    async fn recent_cycles(&self, limit: i64) -> Result<Vec<CycleRunRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, CycleRunRecord>(
            "SELECT * FROM cycle_runs ORDER BY started_at DESC, id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("Failed to list cycle runs: {}", e)))?;

        Ok(records)
    }
}
