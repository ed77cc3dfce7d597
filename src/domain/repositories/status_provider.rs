use async_trait::async_trait;

use crate::domain::entities::ledger_account::AccountId;
use crate::domain::entities::upstream_status::UpstreamStatus;

/// Source of live per-account status.
///
/// `None` means the status is temporarily unavailable (non-success
/// response, transport failure, unusable identifier); it is never an error
/// for the caller.
#[async_trait]
pub trait StatusProvider: Send + Sync {
    async fn fetch_status(&self, account_id: &AccountId) -> Option<UpstreamStatus>;
}
