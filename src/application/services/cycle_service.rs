//! One reconciliation cycle: ledger → status → derived row → backend.
//!
//! Accounts are processed strictly one after another with a fixed delay
//! between status calls. Write failures are counted and logged but never
//! stop the cycle; only a ledger that cannot be loaded aborts it.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::ledger_loader::LedgerLoader;
use crate::domain::entities::cycle_report::CycleReport;
use crate::domain::entities::ledger_account::{AccountId, LedgerAccount};
use crate::domain::entities::snapshot_row::SnapshotRow;
use crate::domain::errors::CycleError;
use crate::domain::repositories::rest_backend::{RestBackend, WriteOutcome};
use crate::domain::repositories::status_provider::StatusProvider;
use crate::domain::services::reconciliation::{reconcile_account, AccountOutcome, ReconciliationPolicy};
use crate::domain::services::schedule::CycleTrigger;
use crate::infrastructure::deploy_notifier::DeployNotifier;

const HEARTBEAT_EVERY: usize = 50;
const DATA_LINES: usize = 10;
const LOGGED_INVALID_IDS: usize = 5;

pub struct CycleService {
    loader: LedgerLoader,
    backend: Arc<dyn RestBackend>,
    status: Arc<dyn StatusProvider>,
    notifier: Option<Arc<DeployNotifier>>,
    snapshot_table: String,
    policy: ReconciliationPolicy,
    account_delay: Duration,
}

impl CycleService {
    pub fn new(
        loader: LedgerLoader,
        backend: Arc<dyn RestBackend>,
        status: Arc<dyn StatusProvider>,
        snapshot_table: &str,
        policy: ReconciliationPolicy,
        account_delay: Duration,
    ) -> Self {
        Self {
            loader,
            backend,
            status,
            notifier: None,
            snapshot_table: snapshot_table.to_string(),
            policy,
            account_delay,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<DeployNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn snapshot_table(&self) -> &str {
        &self.snapshot_table
    }

    /// Run a full pass over the ledger
    pub async fn run_cycle(&self, trigger: CycleTrigger) -> Result<CycleReport, CycleError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(
            "CYCLE START {} ({}) | baseline_equity={} | account_delay={:?}",
            started_at.to_rfc3339(),
            trigger,
            self.policy.baseline_equity,
            self.account_delay
        );

        let accounts = self.loader.load().await?;
        let mut report = CycleReport::new(trigger, started_at);
        report.loaded = accounts.len();

        if accounts.is_empty() {
            info!("No ledger rows to process (table empty or filtered)");
            report.finished_at = Utc::now();
            return Ok(report);
        }

        let total = accounts.len();
        for (index, account) in accounts.iter().enumerate() {
            let Some(account_id) = account.account_id() else {
                report.skipped_invalid_id += 1;
                if report.skipped_invalid_id <= LOGGED_INVALID_IDS {
                    info!("Skipping invalid account id: raw={}", account.raw_id);
                }
                continue;
            };

            debug!(
                "[{}/{}] fetching status for {} ({})",
                index + 1,
                total,
                account_id,
                account.customer_name.as_deref().unwrap_or("-")
            );
            self.process_account(&account_id, account, &mut report).await;

            if !self.account_delay.is_zero() {
                sleep(self.account_delay).await;
            }

            let handled = report.published + report.retracted + report.untouched + report.write_errors;
            if handled > 0 && handled % HEARTBEAT_EVERY == 0 {
                info!(
                    "HEARTBEAT handled={}/{} published={} retracted={} skipped={} status_missing={} errors={} elapsed={}s",
                    handled,
                    total,
                    report.published,
                    report.retracted,
                    report.skipped_invalid_id,
                    report.status_missing,
                    report.write_errors,
                    clock.elapsed().as_secs()
                );
            }
        }

        report.finished_at = Utc::now();
        info!(
            "CYCLE DONE ({}) loaded={} published={} retracted={} untouched={} skipped={} status_missing={} errors={} runtime={:.1}s",
            trigger,
            report.loaded,
            report.published,
            report.retracted,
            report.untouched,
            report.skipped_invalid_id,
            report.status_missing,
            report.write_errors,
            report.runtime_secs()
        );

        if let Some(notifier) = &self.notifier {
            notifier.notify(&format!("{} update", trigger)).await;
        }

        Ok(report)
    }

    async fn process_account(
        &self,
        account_id: &AccountId,
        account: &LedgerAccount,
        report: &mut CycleReport,
    ) {
        let status = self.status.fetch_status(account_id).await;
        if status.is_none() {
            report.status_missing += 1;
        }

        match reconcile_account(account_id, account, status.as_ref(), &self.policy, report.started_at) {
            AccountOutcome::Publish(row) => {
                if report.published < DATA_LINES {
                    info!(
                        "DATA id={} equity={:?} open_pnl={:?} pct={:?} source={} group={:?}",
                        row.account_id, row.equity, row.open_pnl, row.pct_change, row.source, row.group_name
                    );
                }
                let payload = match serde_json::to_value(row.as_ref()) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Could not encode row for {}: {}", account_id, e);
                        report.write_errors += 1;
                        return;
                    }
                };
                match self
                    .backend
                    .upsert(&self.snapshot_table, &payload, &[SnapshotRow::KEY_COLUMN])
                    .await
                {
                    WriteOutcome::Applied => report.published += 1,
                    WriteOutcome::Failed => report.write_errors += 1,
                }
            }
            AccountOutcome::Retract(reason) => {
                info!("FILTER id={}: {}; deleting stale row if present", account_id, reason);
                let filters = vec![(
                    SnapshotRow::KEY_COLUMN.to_string(),
                    format!("eq.{}", account_id),
                )];
                match self.backend.delete(&self.snapshot_table, &filters).await {
                    WriteOutcome::Applied => report.retracted += 1,
                    WriteOutcome::Failed => report.write_errors += 1,
                }
            }
            AccountOutcome::Untouched => {
                warn!("Status unavailable for {}; keeping existing row", account_id);
                report.untouched += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::ledger_loader::LedgerSource;
    use crate::domain::entities::ledger_account::LedgerColumns;
    use crate::domain::entities::upstream_status::UpstreamStatus;
    use crate::domain::repositories::rest_backend::{BackendResult, SelectQuery};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use serde_json::{json, Value};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    /// Ledger rows plus an in-memory snapshot table keyed by account_id
    struct MemoryBackend {
        ledger: Vec<Value>,
        snapshot: Mutex<BTreeMap<String, Value>>,
        fail_upserts_for: Option<String>,
    }

    #[async_trait]
    impl RestBackend for MemoryBackend {
        async fn select(&self, _table: &str, query: &SelectQuery) -> BackendResult<Vec<Value>> {
            let offset = query.offset.unwrap_or(0);
            let limit = query.limit.unwrap_or(usize::MAX);
            Ok(self.ledger.iter().skip(offset).take(limit).cloned().collect())
        }

        async fn upsert(&self, _table: &str, row: &Value, _conflict: &[&str]) -> WriteOutcome {
            let id = row["account_id"].as_str().unwrap_or_default().to_string();
            if self.fail_upserts_for.as_deref() == Some(id.as_str()) {
                return WriteOutcome::Failed;
            }
            self.snapshot.lock().unwrap().insert(id, row.clone());
            WriteOutcome::Applied
        }

        async fn delete(&self, _table: &str, filters: &[(String, String)]) -> WriteOutcome {
            let id = filters[0].1.trim_start_matches("eq.").to_string();
            self.snapshot.lock().unwrap().remove(&id);
            WriteOutcome::Applied
        }
    }

    struct FixedStatus(HashMap<String, UpstreamStatus>);

    #[async_trait]
    impl StatusProvider for FixedStatus {
        async fn fetch_status(&self, account_id: &AccountId) -> Option<UpstreamStatus> {
            self.0.get(account_id.as_str()).cloned()
        }
    }

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn created(at: DateTime<Utc>, equity: Option<f64>) -> UpstreamStatus {
        UpstreamStatus {
            created_at: Some(at),
            equity,
            ..UpstreamStatus::default()
        }
    }

    fn service(backend: Arc<MemoryBackend>, statuses: HashMap<String, UpstreamStatus>) -> CycleService {
        let loader = LedgerLoader::new(
            backend.clone(),
            LedgerSource {
                table: "lv_tpaccount".to_string(),
                columns: LedgerColumns::default(),
                page_size: 2,
                hard_limit: None,
                exclude_keyword: "purchases".to_string(),
            },
        );
        CycleService::new(
            loader,
            backend,
            Arc::new(FixedStatus(statuses)),
            "e2t_demo_live",
            ReconciliationPolicy::default(),
            Duration::ZERO,
        )
    }

    fn ledger() -> Vec<Value> {
        vec![
            json!({"lv_name": "101", "lv_accountidname": "Ada", "lv_tempname": "50k"}),
            json!({"lv_name": 102.0, "lv_accountidname": "Bob", "lv_tempname": "50k"}),
            json!({"lv_name": null, "lv_accountidname": "Nobody", "lv_tempname": "50k"}),
            json!({"lv_name": "103", "lv_accountidname": "Cy", "lv_tempname": "50k"}),
            json!({"lv_name": "104", "lv_accountidname": "Di", "lv_tempname": "purchases"}),
        ]
    }

    #[tokio::test]
    async fn test_cycle_publishes_retracts_and_counts() {
        let mut existing = BTreeMap::new();
        existing.insert("102".to_string(), json!({"account_id": "102", "stale": true}));
        let backend = Arc::new(MemoryBackend {
            ledger: ledger(),
            snapshot: Mutex::new(existing),
            fail_upserts_for: None,
        });

        let mut statuses = HashMap::new();
        statuses.insert("101".to_string(), created(ts(2025, 11, 5), Some(55_000.0)));
        statuses.insert("102".to_string(), created(ts(2025, 10, 1), Some(70_000.0)));

        let report = service(backend.clone(), statuses)
            .run_cycle(CycleTrigger::Manual)
            .await
            .unwrap();

        assert_eq!(report.loaded, 4);
        assert_eq!(report.skipped_invalid_id, 1);
        assert_eq!(report.published, 1);
        // 102 before cutoff, 103 without status: both retracted
        assert_eq!(report.retracted, 2);
        assert_eq!(report.status_missing, 1);
        assert_eq!(report.write_errors, 0);

        let snapshot = backend.snapshot.lock().unwrap();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["101"]);
        assert_eq!(snapshot["101"]["pct_change"], json!(10.0));
        assert_eq!(snapshot["101"]["customer_name"], json!("Ada"));
        assert_eq!(snapshot["101"]["source"], json!("equity"));
    }

    #[tokio::test]
    async fn test_rerun_overwrites_instead_of_duplicating() {
        let backend = Arc::new(MemoryBackend {
            ledger: ledger(),
            snapshot: Mutex::new(BTreeMap::new()),
            fail_upserts_for: None,
        });
        let mut statuses = HashMap::new();
        statuses.insert("101".to_string(), created(ts(2025, 11, 5), Some(55_000.0)));
        statuses.insert("103".to_string(), created(ts(2025, 11, 6), None));
        let service = service(backend.clone(), statuses);

        service.run_cycle(CycleTrigger::Refresh).await.unwrap();
        let first = backend.snapshot.lock().unwrap().len();
        service.run_cycle(CycleTrigger::Refresh).await.unwrap();

        assert_eq!(first, 2);
        assert_eq!(backend.snapshot.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stop_cycle() {
        let backend = Arc::new(MemoryBackend {
            ledger: ledger(),
            snapshot: Mutex::new(BTreeMap::new()),
            fail_upserts_for: Some("101".to_string()),
        });
        let mut statuses = HashMap::new();
        statuses.insert("101".to_string(), created(ts(2025, 11, 5), Some(55_000.0)));
        statuses.insert("103".to_string(), created(ts(2025, 11, 6), Some(40_000.0)));

        let report = service(backend.clone(), statuses)
            .run_cycle(CycleTrigger::Refresh)
            .await
            .unwrap();

        assert_eq!(report.write_errors, 1);
        assert_eq!(report.published, 1);
        assert!(backend.snapshot.lock().unwrap().contains_key("103"));
    }
}
