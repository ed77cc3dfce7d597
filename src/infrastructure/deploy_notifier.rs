//! Fire-and-forget deployment hook, pinged after a cycle that produced data

use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Hook disabled or no URL configured; nothing was sent
    Disabled,
    Delivered,
    Rejected(u16),
    Failed,
}

pub struct DeployNotifier {
    client: Client,
    hook_url: Option<String>,
    enabled: bool,
}

impl DeployNotifier {
    pub fn new(enabled: bool, hook_url: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(NOTIFY_TIMEOUT).build()?;
        Ok(Self {
            client,
            hook_url: hook_url.filter(|url| !url.trim().is_empty()),
            enabled,
        })
    }

    pub fn is_active(&self) -> bool {
        self.enabled && self.hook_url.is_some()
    }

    /// POST `{"trigger_title": ...}` once. Never retried, never fails.
    pub async fn notify(&self, reason: &str) -> NotifyOutcome {
        let Some(url) = self.hook_url.as_deref().filter(|_| self.enabled) else {
            return NotifyOutcome::Disabled;
        };

        let title = format!(
            "snapshot worker: {} @ {}",
            reason,
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        match self
            .client
            .post(url)
            .json(&json!({ "trigger_title": title }))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!("Deploy hook OK ({})", reason);
                NotifyOutcome::Delivered
            }
            Ok(response) => {
                let code = response.status().as_u16();
                warn!("Deploy hook returned {} ({})", code, reason);
                NotifyOutcome::Rejected(code)
            }
            Err(e) => {
                warn!("Deploy hook failed ({}): {}", reason, e);
                NotifyOutcome::Failed
            }
        }
    }
}
