pub mod cycle_service;
pub mod ledger_loader;

pub use cycle_service::CycleService;
pub use ledger_loader::{ExclusionFilter, LedgerLoader, LedgerSource};
