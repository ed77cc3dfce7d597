//! Read-only projection API over the snapshot table

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::application::actors::scheduler_actor::{SchedulerHandle, SchedulerStatus};
use crate::auth::{require_auth, BearerToken};
use crate::domain::entities::cycle_report::CycleReport;
use crate::domain::entities::snapshot_row::SnapshotRow;
use crate::domain::repositories::rest_backend::{OrderBy, RestBackend, SelectQuery};
use crate::rate_limit::{throttle, ApiLimiter};

pub const DEFAULT_LIMIT: i64 = 5000;
pub const MAX_LIMIT: i64 = 10_000;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn RestBackend>,
    pub snapshot_table: String,
    pub scheduler: Option<SchedulerHandle>,
}

/// Query parameters for the latest rows endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct LatestQuery {
    /// Number of rows (1..=10000, default 5000)
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub ts: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LatestResponse {
    pub ts: String,
    #[serde(rename = "demo_live")]
    pub rows: Vec<Value>,
    pub count: usize,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        ts: now_iso(),
    })
}

/// Snapshot rows ranked by displayed change, fastest first on ties
pub async fn latest_rows(
    State(state): State<AppState>,
    Query(params): Query<LatestQuery>,
) -> Result<Json<LatestResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("limit must be between 1 and {}", MAX_LIMIT),
        ));
    }

    let query = SelectQuery::new(SnapshotRow::PROJECTION)
        .order_by(OrderBy::desc("pct_display").nulls_last())
        .order_by(OrderBy::asc("time_taken_hours"))
        .limit(limit as usize);

    let rows = state
        .backend
        .select(&state.snapshot_table, &query)
        .await
        .map_err(|e| {
            tracing::error!("Snapshot read failed: {}", e);
            api_error(StatusCode::BAD_GATEWAY, "snapshot backend unavailable")
        })?;

    Ok(Json(LatestResponse {
        ts: now_iso(),
        count: rows.len(),
        rows,
    }))
}

pub async fn scheduler_status(
    State(state): State<AppState>,
) -> Result<Json<SchedulerStatus>, ApiError> {
    let Some(scheduler) = &state.scheduler else {
        return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "scheduler not running"));
    };
    scheduler
        .status()
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "scheduler stopped"))
}

/// Run a manual cycle and return its report once it has finished
pub async fn run_cycle(State(state): State<AppState>) -> Result<Json<CycleReport>, ApiError> {
    let Some(scheduler) = &state.scheduler else {
        return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "scheduler not running"));
    };
    tracing::info!("Manual cycle requested through the API");
    scheduler
        .run_now()
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "scheduler stopped"))
}

/// CORS for browser dashboards. `*` in the list allows any origin;
/// entries that are not valid header values are ignored.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = if origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        CorsLayer::new().allow_origin(allowed)
    };

    cors.allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
}

/// Build the API router. `/health` is always open; the other routes need
/// the bearer token when one is configured.
pub fn router(
    state: AppState,
    token: Option<BearerToken>,
    limiter: ApiLimiter,
    cors_origins: &[String],
) -> Router {
    let mut protected = Router::new()
        .route("/data/latest", get(latest_rows))
        .route("/status", get(scheduler_status))
        .route("/run", post(run_cycle));
    if let Some(token) = token {
        protected = protected.route_layer(middleware::from_fn_with_state(token, require_auth));
    }

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(middleware::from_fn_with_state(limiter, throttle))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
