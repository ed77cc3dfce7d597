//! Reconciliation module
//!
//! Turns a ledger account plus its upstream status into the row to publish,
//! or into a decision to retract it.

pub mod elapsed;
pub mod engine;
pub mod equity;

pub use elapsed::{format_period, time_taken_hours, ZERO_PERIOD};
pub use engine::*;
pub use equity::{pct_change, pct_display, resolve_equity, PCT_DISPLAY_CAP};
