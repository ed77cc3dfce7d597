pub mod cycle_report;
pub mod ledger_account;
pub mod snapshot_row;
pub mod upstream_status;

pub use cycle_report::CycleReport;
pub use ledger_account::{AccountId, LedgerAccount, LedgerColumns};
pub use snapshot_row::{EquitySource, SnapshotRow};
pub use upstream_status::UpstreamStatus;
