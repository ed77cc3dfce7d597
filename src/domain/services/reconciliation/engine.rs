//! Per-account derivation of the canonical snapshot row

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

use super::elapsed::{format_period, time_taken_hours};
use super::equity::{pct_change, pct_display, resolve_status_equity};
use crate::domain::entities::ledger_account::{AccountId, LedgerAccount};
use crate::domain::entities::snapshot_row::SnapshotRow;
use crate::domain::entities::upstream_status::UpstreamStatus;

/// Inputs of the derivation that do not come from the account itself
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationPolicy {
    pub baseline_equity: f64,
    /// Accounts created before this instant are not published
    pub creation_cutoff: DateTime<Utc>,
    /// Leave an existing row alone when the status API gave nothing back,
    /// instead of treating the account as having no creation time
    pub retain_when_unavailable: bool,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        Self {
            baseline_equity: 50_000.0,
            creation_cutoff: Utc
                .with_ymd_and_hms(2025, 11, 1, 0, 0, 0)
                .single()
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            retain_when_unavailable: false,
        }
    }
}

/// Why an account's row is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetractReason {
    MissingCreationTime,
    BeforeCutoff { created_at: DateTime<Utc> },
}

impl fmt::Display for RetractReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MissingCreationTime => write!(f, "missing creation time"),
            Self::BeforeCutoff { created_at } => {
                write!(f, "created {} before cutoff", created_at.to_rfc3339())
            }
        }
    }
}

/// What to do with an account's row this cycle
#[derive(Debug, Clone, PartialEq)]
pub enum AccountOutcome {
    /// Upsert this row
    Publish(Box<SnapshotRow>),
    /// Delete any existing row and leave the account out of this cycle
    Retract(RetractReason),
    /// Status unavailable and the policy says to keep what is there
    Untouched,
}

/// Derive the outcome for one account.
///
/// Pure: the same inputs always give the same outcome. `now` becomes the
/// row's `updated_at`.
pub fn reconcile_account(
    account_id: &AccountId,
    account: &LedgerAccount,
    status: Option<&UpstreamStatus>,
    policy: &ReconciliationPolicy,
    now: DateTime<Utc>,
) -> AccountOutcome {
    if status.is_none() && policy.retain_when_unavailable {
        return AccountOutcome::Untouched;
    }

    let Some(created_at) = status.and_then(|s| s.created_at) else {
        return AccountOutcome::Retract(RetractReason::MissingCreationTime);
    };
    if created_at < policy.creation_cutoff {
        return AccountOutcome::Retract(RetractReason::BeforeCutoff { created_at });
    }

    let (equity, source) = resolve_status_equity(status);
    let change = pct_change(equity, policy.baseline_equity);
    let last_closed_at = status.and_then(|s| s.last_closed_at);

    AccountOutcome::Publish(Box::new(SnapshotRow {
        account_id: account_id.clone(),
        customer_name: account.customer_name.clone(),
        temp_name: account.temp_name.clone(),
        country: status.and_then(|s| s.country.clone()),
        balance: status.and_then(|s| s.balance),
        plan: policy.baseline_equity,
        equity,
        open_pnl: status.and_then(|s| s.open_pnl),
        pct_change: change,
        pct_display: pct_display(change),
        created_at,
        last_closed_at,
        time_taken_hours: time_taken_hours(Some(created_at), last_closed_at),
        period: format_period(Some(created_at), last_closed_at),
        source,
        group_name: status.and_then(|s| s.group_name.clone()),
        updated_at: now,
    }))
}
