use crate::domain::entities::ledger_account::AccountId;
use crate::domain::entities::upstream_status::UpstreamStatus;
use crate::domain::repositories::status_provider::StatusProvider;
use crate::domain::services::status_extraction::extract_status;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Default per-request timeout for status calls
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(20);

/// Trading-status endpoint settings
#[derive(Clone)]
pub struct TradingStatusConfig {
    pub endpoint: String,
    pub token: Zeroizing<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for TradingStatusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingStatusConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Request body of the user-status call. Only closed positions and
/// monetary transactions are requested.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UserStatusRequest<'a> {
    #[serde(rename = "UserID")]
    user_id: &'a str,
    get_open_positions: bool,
    get_pending_positions: bool,
    get_close_positions: bool,
    get_monetary_transactions: bool,
}

impl<'a> UserStatusRequest<'a> {
    fn history_only(user_id: &'a str) -> Self {
        Self {
            user_id,
            get_open_positions: false,
            get_pending_positions: false,
            get_close_positions: true,
            get_monetary_transactions: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum StatusFetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(StatusCode),
}

/// reqwest-backed [`StatusProvider`]
pub struct TradingStatusClient {
    client: Client,
    config: TradingStatusConfig,
}

impl TradingStatusClient {
    pub fn new(config: TradingStatusConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn fetch_raw(&self, account_id: &AccountId) -> Result<Value, StatusFetchError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.token.as_str())
            .header("Accept", "application/json")
            .json(&UserStatusRequest::history_only(account_id.as_str()))
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(StatusFetchError::Status(response.status()));
        }

        let body: Option<Value> = response.json().await?;
        Ok(body.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl StatusProvider for TradingStatusClient {
    async fn fetch_status(&self, account_id: &AccountId) -> Option<UpstreamStatus> {
        match self.fetch_raw(account_id).await {
            Ok(body) => {
                debug!("status received for {}", account_id);
                Some(extract_status(&body))
            }
            Err(e) => {
                warn!("status unavailable for {}: {}", account_id, e);
                None
            }
        }
    }
}
