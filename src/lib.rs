//! Snapshot Worker Library
//!
//! Reconciles a customer-account ledger with live trading-account status and
//! publishes one ranked snapshot row per account.

pub mod application;
pub mod auth;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;
pub mod secrets;
