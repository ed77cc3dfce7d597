use chrono::{DateTime, Utc};

/// Point-in-time account status as reported by the trading platform.
///
/// Every field is optional: the upstream schema is loose and any section can
/// be missing. Rebuilt on every cycle, never stored as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpstreamStatus {
    pub country: Option<String>,
    /// Amount of the "initial balance" transaction, if any
    pub plan: Option<f64>,
    pub balance: Option<f64>,
    pub equity: Option<f64>,
    pub open_pnl: Option<f64>,
    pub group_name: Option<String>,
    pub is_purchase_group: bool,
    pub blown_up: bool,
    pub zero_balance_amount: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_closed_at: Option<DateTime<Utc>>,
}
