pub mod deploy_notifier;
pub mod postgrest_client;
pub mod retry;
pub mod trading_status_client;

pub use deploy_notifier::{DeployNotifier, NotifyOutcome};
pub use postgrest_client::{PostgrestClient, PostgrestConfig};
pub use retry::RetryPolicy;
pub use trading_status_client::{TradingStatusClient, TradingStatusConfig};
