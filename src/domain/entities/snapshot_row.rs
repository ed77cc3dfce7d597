use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ledger_account::AccountId;

/// Where the published equity figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquitySource {
    Equity,
    ZeroBalanceTxn,
    Missing,
}

impl fmt::Display for EquitySource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Equity => "equity",
                Self::ZeroBalanceTxn => "zero_balance_txn",
                Self::Missing => "missing",
            }
        )
    }
}

/// The persisted per-account record, keyed by `account_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub account_id: AccountId,
    pub customer_name: Option<String>,
    pub temp_name: Option<String>,
    pub country: Option<String>,
    pub balance: Option<f64>,
    /// Baseline equity constant, not the upstream plan amount
    pub plan: f64,
    pub equity: Option<f64>,
    pub open_pnl: Option<f64>,
    pub pct_change: Option<f64>,
    pub pct_display: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub last_closed_at: Option<DateTime<Utc>>,
    pub time_taken_hours: f64,
    pub period: String,
    pub source: EquitySource,
    pub group_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SnapshotRow {
    /// Upsert conflict key
    pub const KEY_COLUMN: &'static str = "account_id";

    /// Columns returned by the read projection
    pub const PROJECTION: &'static str = "account_id,customer_name,temp_name,country,plan,equity,\
        open_pnl,pct_change,pct_display,created_at,last_closed_at,time_taken_hours,period,source,\
        group_name,updated_at";
}
