pub mod reconciliation;
pub mod schedule;
pub mod status_extraction;
pub mod timestamps;
