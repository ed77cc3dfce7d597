//! Scheduler Actor
//!
//! Owns the wall-clock schedule and drives one reconciliation cycle at a
//! time. Requests arrive over an mpsc channel; a request received while a
//! cycle is running waits until the cycle has finished.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::application::services::cycle_service::CycleService;
use crate::domain::entities::cycle_report::CycleReport;
use crate::domain::services::schedule::{CycleTrigger, Schedule, Wake};
use crate::persistence::models::CycleRunRecord;
use crate::persistence::state_repository::WorkerStateStore;

/// Channel capacity for scheduler messages
const SCHEDULER_CHANNEL_CAPACITY: usize = 16;

/// Cycle summaries included in a status reply
const STATUS_RECENT_RUNS: i64 = 10;

/// Messages that can be sent to the scheduler actor
#[derive(Debug)]
pub enum SchedulerMessage {
    /// Run a cycle now, outside the schedule
    RunNow { reply: oneshot::Sender<CycleReport> },

    /// Snapshot of the scheduler state
    GetStatus { reply: oneshot::Sender<SchedulerStatus> },

    /// Stop the loop
    Shutdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running_since: DateTime<Utc>,
    pub cycles_run: u64,
    pub cycles_failed: u64,
    pub last_baseline: Option<DateTime<Utc>>,
    pub next_wake_at: DateTime<Utc>,
    pub next_trigger: String,
    pub last_report: Option<CycleReport>,
    /// Newest first, from the state store
    pub recent_runs: Vec<CycleRunRecord>,
}

/// Cloneable handle used by the API and by `main`
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerMessage>,
}

impl SchedulerHandle {
    pub async fn run_now(&self) -> Option<CycleReport> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(SchedulerMessage::RunNow { reply }).await.ok()?;
        rx.await.ok()
    }

    pub async fn status(&self) -> Option<SchedulerStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(SchedulerMessage::GetStatus { reply }).await.ok()?;
        rx.await.ok()
    }

    pub async fn shutdown(&self) {
        if self.tx.send(SchedulerMessage::Shutdown).await.is_err() {
            debug!("Scheduler already stopped");
        }
    }
}

pub struct SchedulerActor {
    service: Arc<CycleService>,
    store: Arc<dyn WorkerStateStore>,
    schedule: Schedule,
    run_on_start: bool,
    started_at: DateTime<Utc>,
    last_baseline: Option<DateTime<Utc>>,
    /// Earliest time a failed baseline may be retried
    baseline_deferred_until: Option<DateTime<Utc>>,
    last_report: Option<CycleReport>,
    cycles_run: u64,
    cycles_failed: u64,
}

impl SchedulerActor {
    pub fn new(
        service: Arc<CycleService>,
        store: Arc<dyn WorkerStateStore>,
        schedule: Schedule,
        run_on_start: bool,
    ) -> Self {
        Self {
            service,
            store,
            schedule,
            run_on_start,
            started_at: Utc::now(),
            last_baseline: None,
            baseline_deferred_until: None,
            last_report: None,
            cycles_run: 0,
            cycles_failed: 0,
        }
    }

    /// Spawn the actor and return its handle together with the task
    pub fn spawn(self) -> (SchedulerHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(SCHEDULER_CHANNEL_CAPACITY);
        let task = tokio::spawn(self.run(rx));
        info!("SchedulerActor spawned");
        (SchedulerHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SchedulerMessage>) {
        self.last_baseline = match self.store.last_baseline().await {
            Ok(last) => last,
            Err(e) => {
                warn!("Could not read last baseline, assuming none: {}", e);
                None
            }
        };
        info!(
            "SchedulerActor started (schedule: {:?}, last baseline: {:?})",
            self.schedule, self.last_baseline
        );

        if self.run_on_start {
            self.execute(CycleTrigger::Startup).await;
        }

        loop {
            let wake = self.next_wake(Utc::now());
            let wait = (wake.at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            info!(
                "Next {} cycle at {} (in {}s)",
                wake.trigger,
                wake.at.to_rfc3339(),
                wait.as_secs()
            );

            // Due work goes first so a queued request cannot postpone it
            tokio::select! {
                biased;
                _ = sleep(wait) => {
                    self.execute(wake.trigger).await;
                }
                msg = rx.recv() => match msg {
                    Some(SchedulerMessage::RunNow { reply }) => {
                        let report = self.execute(CycleTrigger::Manual).await;
                        if reply.send(report).is_err() {
                            debug!("RunNow requester went away");
                        }
                    }
                    Some(SchedulerMessage::GetStatus { reply }) => {
                        if reply.send(self.status(wake).await).is_err() {
                            debug!("GetStatus requester went away");
                        }
                    }
                    Some(SchedulerMessage::Shutdown) | None => {
                        info!("SchedulerActor received shutdown signal");
                        break;
                    }
                },
            }
        }

        info!("SchedulerActor stopped");
    }

    fn next_wake(&self, now: DateTime<Utc>) -> Wake {
        let wake = self.schedule.next_wake(self.last_baseline, now);
        match self.baseline_deferred_until {
            Some(deferred) if wake.trigger == CycleTrigger::Baseline && wake.at < deferred => Wake {
                at: deferred,
                trigger: CycleTrigger::Baseline,
            },
            _ => wake,
        }
    }

    async fn status(&self, wake: Wake) -> SchedulerStatus {
        let recent_runs = match self.store.recent_cycles(STATUS_RECENT_RUNS).await {
            Ok(runs) => runs,
            Err(e) => {
                warn!("Could not list recent cycles: {}", e);
                Vec::new()
            }
        };

        SchedulerStatus {
            running_since: self.started_at,
            cycles_run: self.cycles_run,
            cycles_failed: self.cycles_failed,
            last_baseline: self.last_baseline,
            next_wake_at: wake.at,
            next_trigger: wake.trigger.to_string(),
            last_report: self.last_report.clone(),
            recent_runs,
        }
    }

    /// Run one cycle to completion and record its outcome. Never fails.
    async fn execute(&mut self, trigger: CycleTrigger) -> CycleReport {
        let started_at = Utc::now();
        let report = match self.service.run_cycle(trigger).await {
            Ok(report) => report,
            Err(e) => {
                error!("Cycle ({}) aborted: {}", trigger, e);
                CycleReport::aborted(trigger, started_at, e.to_string())
            }
        };

        self.cycles_run += 1;
        if !report.is_success() {
            self.cycles_failed += 1;
        }

        if trigger == CycleTrigger::Baseline {
            if report.is_success() {
                self.mark_baseline(report.started_at).await;
            } else {
                let retry_at = self.schedule.next_refresh(Utc::now());
                warn!("Baseline failed; next attempt no earlier than {}", retry_at.to_rfc3339());
                self.baseline_deferred_until = Some(retry_at);
            }
        }

        if let Err(e) = self.store.record_cycle(&report).await {
            warn!("Could not record cycle summary: {}", e);
        }

        self.last_report = Some(report.clone());
        report
    }

    async fn mark_baseline(&mut self, at: DateTime<Utc>) {
        self.last_baseline = Some(at);
        self.baseline_deferred_until = None;
        if let Err(e) = self.store.set_last_baseline(at).await {
            error!("Could not persist baseline timestamp: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::ledger_loader::{LedgerLoader, LedgerSource};
    use crate::domain::entities::ledger_account::{AccountId, LedgerColumns};
    use crate::domain::entities::upstream_status::UpstreamStatus;
    use crate::domain::errors::{BackendError, BackendErrorKind, TransientCause};
    use crate::domain::repositories::rest_backend::{BackendResult, RestBackend, SelectQuery, WriteOutcome};
    use crate::domain::repositories::status_provider::StatusProvider;
    use crate::domain::services::reconciliation::ReconciliationPolicy;
    use crate::persistence::{init_database, DatabaseConfig, SqliteStateStore};
    use async_trait::async_trait;
    use chrono::Datelike;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct OneAccountLedger {
        down: AtomicBool,
    }

    #[async_trait]
    impl RestBackend for OneAccountLedger {
        async fn select(&self, _table: &str, query: &SelectQuery) -> BackendResult<Vec<Value>> {
            if self.down.load(Ordering::SeqCst) {
                return Err(BackendError::new(
                    "select",
                    BackendErrorKind::Transient(TransientCause::Connect),
                ));
            }
            if query.offset.unwrap_or(0) > 0 {
                return Ok(Vec::new());
            }
            Ok(vec![json!({"lv_name": "501", "lv_accountidname": "Eve", "lv_tempname": "50k"})])
        }

        async fn upsert(&self, _: &str, _: &Value, _: &[&str]) -> WriteOutcome {
            WriteOutcome::Applied
        }

        async fn delete(&self, _: &str, _: &[(String, String)]) -> WriteOutcome {
            WriteOutcome::Applied
        }
    }

    struct NoStatus;

    #[async_trait]
    impl StatusProvider for NoStatus {
        async fn fetch_status(&self, _: &AccountId) -> Option<UpstreamStatus> {
            None
        }
    }

    async fn store() -> Arc<SqliteStateStore> {
        let pool = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        Arc::new(SqliteStateStore::new(pool))
    }

    fn service(ledger_down: bool) -> Arc<CycleService> {
        let backend = Arc::new(OneAccountLedger {
            down: AtomicBool::new(ledger_down),
        });
        let loader = LedgerLoader::new(
            backend.clone(),
            LedgerSource {
                table: "lv_tpaccount".to_string(),
                columns: LedgerColumns::default(),
                page_size: 100,
                hard_limit: None,
                exclude_keyword: String::new(),
            },
        );
        Arc::new(CycleService::new(
            loader,
            backend,
            Arc::new(NoStatus),
            "e2t_demo_live",
            ReconciliationPolicy::default(),
            Duration::ZERO,
        ))
    }

    /// Baseline anchored at today's midnight, so it is always overdue
    /// until one has been recorded
    fn daily() -> Schedule {
        Schedule {
            baseline_weekday: Utc::now().weekday(),
            baseline_hour: 0,
            refresh_hours: 24,
        }
    }

    #[tokio::test]
    async fn test_overdue_baseline_runs_and_is_persisted() {
        let store = store().await;
        let (handle, task) = SchedulerActor::new(service(false), store.clone(), daily(), false).spawn();

        let status = handle.status().await.unwrap();
        assert_eq!(status.cycles_run, 1);
        assert!(status.last_baseline.is_some());
        assert_eq!(status.last_report.as_ref().unwrap().trigger, CycleTrigger::Baseline);
        assert_eq!(status.next_trigger, "refresh");

        assert_eq!(store.last_baseline().await.unwrap(), status.last_baseline);
        assert_eq!(store.recent_cycles(10).await.unwrap().len(), 1);

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_startup_and_manual_runs_do_not_count_as_baseline() {
        let store = store().await;
        store.set_last_baseline(Utc::now()).await.unwrap();
        let recorded = store.last_baseline().await.unwrap();
        let (handle, task) = SchedulerActor::new(service(false), store.clone(), daily(), true).spawn();

        let report = handle.run_now().await.unwrap();
        assert_eq!(report.trigger, CycleTrigger::Manual);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.retracted, 1);

        let status = handle.status().await.unwrap();
        assert_eq!(status.cycles_run, 2);
        assert_eq!(status.last_baseline, recorded);

        let runs = store.recent_cycles(10).await.unwrap();
        let kinds: Vec<&str> = runs.iter().map(|r| r.trigger_kind.as_str()).collect();
        assert!(kinds.contains(&"startup"));
        assert!(kinds.contains(&"manual"));

        let status = handle.status().await.unwrap();
        assert_eq!(status.recent_runs.len(), 2);
        assert_eq!(status.recent_runs[0].id, runs[0].id);

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_baseline_is_deferred_not_looped() {
        let store = store().await;
        let (handle, task) = SchedulerActor::new(service(true), store.clone(), daily(), false).spawn();

        let status = handle.status().await.unwrap();
        assert_eq!(status.cycles_run, 1);
        assert_eq!(status.cycles_failed, 1);
        assert!(status.last_baseline.is_none());
        assert_eq!(status.next_trigger, "baseline");
        assert!(status.next_wake_at > Utc::now());
        assert!(status.last_report.unwrap().error.is_some());
        assert_eq!(store.last_baseline().await.unwrap(), None);

        handle.shutdown().await;
        task.await.unwrap();
    }
}
