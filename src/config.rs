use crate::domain::entities::ledger_account::LedgerColumns;
use crate::domain::errors::ConfigError;
use crate::domain::services::reconciliation::ReconciliationPolicy;
use crate::domain::services::schedule::Schedule;
use crate::domain::services::timestamps::parse_timestamp;
use crate::infrastructure::postgrest_client::PostgrestConfig;
use crate::infrastructure::trading_status_client::{TradingStatusConfig, STATUS_TIMEOUT};
use crate::persistence::DatabaseConfig;
use crate::secrets::{load_first_secret, load_optional_secret, load_secret};
use chrono::Weekday;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use zeroize::Zeroizing;

/// Read-only projection API settings
#[derive(Clone)]
pub struct ApiConfig {
    /// API disabled when unset
    pub bind_addr: Option<SocketAddr>,
    /// Bearer token for the data endpoints; open when unset
    pub bearer_token: Option<Zeroizing<String>>,
    pub requests_per_minute: u32,
    /// Allowed browser origins; `*` allows any
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: None,
            bearer_token: None,
            requests_per_minute: 120,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// Everything the worker needs, loaded once at startup
#[derive(Clone)]
pub struct WorkerConfig {
    pub backend_url: String,
    pub backend_key: Zeroizing<String>,
    pub backend_schema: String,

    pub ledger_table: String,
    pub ledger_columns: LedgerColumns,
    pub ledger_page_size: usize,
    pub ledger_hard_limit: Option<usize>,
    pub exclude_keyword: String,
    pub snapshot_table: String,

    pub status_api_url: String,
    pub status_api_token: Zeroizing<String>,

    pub policy: ReconciliationPolicy,
    pub account_delay: Duration,
    pub schedule: Schedule,
    pub run_on_start: bool,

    pub deploy_hook_enabled: bool,
    pub deploy_hook_url: Option<String>,

    pub database: DatabaseConfig,
    pub api: ApiConfig,
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("backend_url", &self.backend_url)
            .field("backend_schema", &self.backend_schema)
            .field("ledger_table", &self.ledger_table)
            .field("ledger_page_size", &self.ledger_page_size)
            .field("ledger_hard_limit", &self.ledger_hard_limit)
            .field("exclude_keyword", &self.exclude_keyword)
            .field("snapshot_table", &self.snapshot_table)
            .field("status_api_url", &self.status_api_url)
            .field("policy", &self.policy)
            .field("account_delay", &self.account_delay)
            .field("schedule", &self.schedule)
            .field("run_on_start", &self.run_on_start)
            .field("deploy_hook_enabled", &self.deploy_hook_enabled)
            .field("database", &self.database)
            .field("api_bind_addr", &self.api.bind_addr)
            .field("api_auth", &self.api.bearer_token.is_some())
            .field("api_cors_origins", &self.api.cors_origins)
            .finish_non_exhaustive()
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            backend_key: Zeroizing::new(String::new()),
            backend_schema: "public".to_string(),

            ledger_table: "lv_tpaccount".to_string(),
            ledger_columns: LedgerColumns::default(),
            ledger_page_size: 1000,
            ledger_hard_limit: None,
            exclude_keyword: "purchases".to_string(),
            snapshot_table: "e2t_demo_live".to_string(),

            status_api_url: String::new(),
            status_api_token: Zeroizing::new(String::new()),

            policy: ReconciliationPolicy::default(),
            account_delay: Duration::from_millis(200),
            schedule: Schedule::default(),
            run_on_start: true,

            deploy_hook_enabled: false,
            deploy_hook_url: None,

            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an optional variable, keeping `current` (with a warning) when the
/// value does not parse or fails `valid`
fn override_with<T, L>(lookup: &L, name: &str, current: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + std::fmt::Debug,
    L: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name).filter(|s| !s.trim().is_empty()) else {
        return current;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        Ok(value) => {
            warn!("Invalid {} value: {:?}, using default: {:?}", name, value, current);
            current
        }
        Err(_) => {
            warn!("Failed to parse {} '{}', using default: {:?}", name, raw, current);
            current
        }
    }
}

fn override_bool<L>(lookup: &L, name: &str, current: bool) -> bool
where
    L: Fn(&str) -> Option<String>,
{
    match lookup(name).filter(|s| !s.trim().is_empty()) {
        None => current,
        Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
            warn!("Failed to parse {} '{}', using default: {}", name, raw, current);
            current
        }),
    }
}

fn required_url<L>(lookup: &L, name: &str) -> Result<String, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::Missing(name.to_string()))?;
    url::Url::parse(&raw).map_err(|e| ConfigError::Invalid {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok(raw)
}

impl WorkerConfig {
    /// Load configuration from environment variables (after `.env`, if any)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::from_lookup(|name| std::env::var(name).ok())?;

        config.backend_key = load_first_secret(&["BACKEND_SERVICE_KEY", "BACKEND_ANON_KEY"])?;
        config.status_api_token = load_secret("STATUS_API_TOKEN")?;
        config.api.bearer_token = load_optional_secret("API_BEARER_TOKEN")?;
        config.database = DatabaseConfig::from_env();

        Ok(config)
    }

    /// Non-secret settings from an arbitrary variable source
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let text = |name: &str| lookup(name).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        config.backend_url = required_url(&lookup, "BACKEND_URL")?;
        config.status_api_url = required_url(&lookup, "STATUS_API_URL")?;

        if let Some(schema) = text("BACKEND_SCHEMA") {
            config.backend_schema = schema;
        }
        if let Some(table) = text("LEDGER_TABLE") {
            config.ledger_table = table;
        }
        if let Some(table) = text("SNAPSHOT_TABLE") {
            config.snapshot_table = table;
        }
        if let Some(keyword) = text("LEDGER_EXCLUDE_KEYWORD") {
            config.exclude_keyword = keyword;
        }

        config.ledger_page_size =
            override_with(&lookup, "LEDGER_PAGE_SIZE", config.ledger_page_size, |v| *v > 0);
        if text("LEDGER_HARD_LIMIT").is_some() {
            let limit = override_with(&lookup, "LEDGER_HARD_LIMIT", 0usize, |v| *v > 0);
            config.ledger_hard_limit = (limit > 0).then_some(limit);
        }

        config.policy.baseline_equity = override_with(
            &lookup,
            "BASELINE_EQUITY",
            config.policy.baseline_equity,
            |v: &f64| v.is_finite() && *v > 0.0,
        );
        if let Some(raw) = text("CREATION_CUTOFF") {
            match parse_timestamp(&raw) {
                Some(cutoff) => config.policy.creation_cutoff = cutoff,
                None => warn!(
                    "Failed to parse CREATION_CUTOFF '{}', using default: {}",
                    raw,
                    config.policy.creation_cutoff.to_rfc3339()
                ),
            }
        }
        config.policy.retain_when_unavailable = override_bool(
            &lookup,
            "RETAIN_ROWS_WHEN_UNAVAILABLE",
            config.policy.retain_when_unavailable,
        );

        let delay_ms = override_with(&lookup, "ACCOUNT_DELAY_MS", 200u64, |v| *v <= 60_000);
        config.account_delay = Duration::from_millis(delay_ms);

        config.schedule.refresh_hours = override_with(
            &lookup,
            "REFRESH_INTERVAL_HOURS",
            config.schedule.refresh_hours,
            |v| (1..=24).contains(v),
        );
        config.schedule.baseline_weekday = override_with(
            &lookup,
            "BASELINE_WEEKDAY",
            config.schedule.baseline_weekday,
            |_: &Weekday| true,
        );
        config.schedule.baseline_hour = override_with(
            &lookup,
            "BASELINE_HOUR_UTC",
            config.schedule.baseline_hour,
            |v| *v < 24,
        );
        config.run_on_start = override_bool(&lookup, "RUN_ON_START", config.run_on_start);

        config.deploy_hook_enabled =
            override_bool(&lookup, "DEPLOY_HOOK_ENABLED", config.deploy_hook_enabled);
        config.deploy_hook_url = text("DEPLOY_HOOK_URL");
        if config.deploy_hook_enabled && config.deploy_hook_url.is_none() {
            warn!("DEPLOY_HOOK_ENABLED is set but DEPLOY_HOOK_URL is empty; notifications disabled");
        }

        if let Some(raw) = text("API_BIND_ADDR") {
            match raw.parse::<SocketAddr>() {
                Ok(addr) => config.api.bind_addr = Some(addr),
                Err(e) => warn!("Invalid API_BIND_ADDR '{}': {}; read API disabled", raw, e),
            }
        }
        config.api.requests_per_minute = override_with(
            &lookup,
            "API_REQUESTS_PER_MINUTE",
            config.api.requests_per_minute,
            |v| *v > 0,
        );
        if let Some(raw) = text("API_CORS_ORIGINS") {
            let origins: Vec<String> = raw
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if !origins.is_empty() {
                config.api.cors_origins = origins;
            }
        }

        Ok(config)
    }

    pub fn postgrest(&self) -> PostgrestConfig {
        let mut config = PostgrestConfig::new(&self.backend_url, self.backend_key.clone());
        config.schema = self.backend_schema.clone();
        config
    }

    pub fn trading_status(&self) -> TradingStatusConfig {
        TradingStatusConfig {
            endpoint: self.status_api_url.clone(),
            token: self.status_api_token.clone(),
            timeout: STATUS_TIMEOUT,
        }
    }
}
