use crate::domain::errors::{truncate, BackendError, BackendErrorKind};
use crate::domain::repositories::rest_backend::{
    BackendResult, RestBackend, SelectQuery, WriteOutcome,
};
use crate::infrastructure::retry::{retry_transient, RetryPolicy};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};
use zeroize::Zeroizing;

/// Default per-request timeout for backend calls
pub const BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgREST connection settings
#[derive(Clone)]
pub struct PostgrestConfig {
    /// Project URL; `/rest/v1` is appended
    pub base_url: String,
    pub api_key: Zeroizing<String>,
    /// Accept-Profile / Content-Profile schema
    pub schema: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for PostgrestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("schema", &self.schema)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl PostgrestConfig {
    pub fn new(base_url: &str, api_key: Zeroizing<String>) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key,
            schema: "public".to_string(),
            timeout: BACKEND_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// reqwest-backed [`RestBackend`] for a PostgREST endpoint
pub struct PostgrestClient {
    client: Client,
    config: PostgrestConfig,
}

impl PostgrestClient {
    pub fn new(config: PostgrestConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(Self::default_headers(&config)?)
            .build()
            .map_err(|e| BackendError::from_reqwest("build backend client", &e))?;

        Ok(Self { client, config })
    }

    fn default_headers(config: &PostgrestConfig) -> Result<HeaderMap, BackendError> {
        let invalid = |name: &str| {
            BackendError::new(
                "build backend client",
                BackendErrorKind::Request(format!("{} is not a valid header value", name)),
            )
        };

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(config.api_key.as_str()).map_err(|_| invalid("api key"))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key.as_str()))
            .map_err(|_| invalid("api key"))?;
        let schema = HeaderValue::from_str(&config.schema).map_err(|_| invalid("schema"))?;

        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("accept-profile", schema.clone());
        headers.insert("content-profile", schema);
        Ok(headers)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.base_url, table)
    }

    async fn error_from_response(operation: &str, response: Response) -> BackendError {
        let code = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        BackendError::from_status(operation, code, body)
    }

    async fn select_once(&self, table: &str, query: &SelectQuery) -> BackendResult<Vec<Value>> {
        let operation = format!("select {}", table);
        let response = self
            .client
            .get(self.table_url(table))
            .query(&query.to_params())
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(&operation, &e))?;

        match response.status() {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => {
                let body: Option<Vec<Value>> = response
                    .json()
                    .await
                    .map_err(|e| BackendError::from_reqwest(&operation, &e))?;
                Ok(body.unwrap_or_default())
            }
            // PostgREST answers 406 for some selects that match no rows
            StatusCode::NOT_ACCEPTABLE => Ok(Vec::new()),
            _ => Err(Self::error_from_response(&operation, response).await),
        }
    }

    async fn upsert_once(
        &self,
        table: &str,
        row: &Value,
        on_conflict: &str,
    ) -> Result<(), BackendError> {
        let operation = format!("upsert {}", table);
        let response = self
            .client
            .post(self.table_url(table))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates")
            .json(row)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(&operation, &e))?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => Ok(()),
            _ => Err(Self::error_from_response(&operation, response).await),
        }
    }

    async fn delete_once(
        &self,
        table: &str,
        filters: &[(String, String)],
    ) -> Result<(), BackendError> {
        let operation = format!("delete {}", table);
        let response = self
            .client
            .delete(self.table_url(table))
            .query(filters)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(&operation, &e))?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            _ => Err(Self::error_from_response(&operation, response).await),
        }
    }
}

#[async_trait]
impl RestBackend for PostgrestClient {
    async fn select(&self, table: &str, query: &SelectQuery) -> BackendResult<Vec<Value>> {
        let operation = format!("select {}", table);
        let result = retry_transient(&operation, &self.config.retry, || {
            self.select_once(table, query)
        })
        .await;

        match &result {
            Ok(rows) => debug!("{}: {} rows", operation, rows.len()),
            Err(e) => error!("{}", e),
        }
        result
    }

    async fn upsert(&self, table: &str, row: &Value, conflict_columns: &[&str]) -> WriteOutcome {
        let operation = format!("upsert {}", table);
        let on_conflict = conflict_columns.join(",");
        let result = retry_transient(&operation, &self.config.retry, || {
            self.upsert_once(table, row, &on_conflict)
        })
        .await;

        match result {
            Ok(()) => WriteOutcome::Applied,
            Err(e) => {
                let rendered = row.to_string();
                error!("{} | row={}", e, truncate(&rendered, 180));
                WriteOutcome::Failed
            }
        }
    }

    async fn delete(&self, table: &str, filters: &[(String, String)]) -> WriteOutcome {
        let operation = format!("delete {}", table);
        let result = retry_transient(&operation, &self.config.retry, || {
            self.delete_once(table, filters)
        })
        .await;

        match result {
            Ok(()) => WriteOutcome::Applied,
            Err(e) => {
                error!("{} | filters={:?}", e, filters);
                WriteOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::rest_backend::OrderBy;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> PostgrestClient {
        let mut config = PostgrestConfig::new(&server.uri(), Zeroizing::new("service-key".to_string()));
        config.retry = RetryPolicy {
            max_attempts: 6,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter: 0.3,
        };
        PostgrestClient::new(config).unwrap()
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let config = PostgrestConfig::new("https://db.example.com/", Zeroizing::new("secret".to_string()));
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret"));
        assert_eq!(config.base_url, "https://db.example.com");
    }

    #[tokio::test]
    async fn test_select_sends_headers_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/e2t_demo_live"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .and(header("accept-profile", "public"))
            .and(query_param("select", "account_id,equity"))
            .and(query_param("order", "pct_display.desc.nullslast"))
            .and(query_param("limit", "10"))
            .and(query_param("account_id", "eq.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"account_id": "7"}])))
            .expect(1)
            .mount(&server)
            .await;

        let query = SelectQuery::new("account_id,equity")
            .order_by(OrderBy::desc("pct_display").nulls_last())
            .filter("account_id", "eq.7")
            .limit(10);
        let rows = client_for(&server).select("e2t_demo_live", &query).await.unwrap();
        assert_eq!(rows, vec![json!({"account_id": "7"})]);
    }

    #[tokio::test]
    async fn test_select_treats_406_as_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(406))
            .expect(1)
            .mount(&server)
            .await;

        let rows = client_for(&server)
            .select("t", &SelectQuery::new("*"))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_select_retries_unavailable_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
            .expect(1)
            .mount(&server)
            .await;

        let rows = client_for(&server)
            .select("t", &SelectQuery::new("*"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_select_gives_up_after_six_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(6)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .select("t", &SelectQuery::new("*"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_select_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad filter"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .select("t", &SelectQuery::new("*"))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("400"));
    }

    #[tokio::test]
    async fn test_upsert_posts_merge_duplicates() {
        let server = MockServer::start().await;
        let row = json!({"account_id": "7", "equity": 1.5});
        Mock::given(method("POST"))
            .and(path("/rest/v1/e2t_demo_live"))
            .and(query_param("on_conflict", "account_id"))
            .and(header("prefer", "resolution=merge-duplicates"))
            .and(body_json(row.clone()))
            .respond_with(ResponseTemplate::new(201))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.upsert("e2t_demo_live", &row, &["account_id"]).await.is_applied());
        assert!(client.upsert("e2t_demo_live", &row, &["account_id"]).await.is_applied());
    }

    #[tokio::test]
    async fn test_upsert_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .upsert("t", &json!({"account_id": "1"}), &["account_id"])
            .await;
        assert_eq!(outcome, WriteOutcome::Failed);
    }

    #[tokio::test]
    async fn test_delete_by_filter() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/e2t_demo_live"))
            .and(query_param("account_id", "eq.42"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let filters = vec![("account_id".to_string(), "eq.42".to_string())];
        let outcome = client_for(&server).delete("e2t_demo_live", &filters).await;
        assert!(outcome.is_applied());
    }

    #[tokio::test]
    async fn test_delete_retries_transient_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(504))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let filters = vec![("account_id".to_string(), "eq.1".to_string())];
        assert!(client_for(&server).delete("t", &filters).await.is_applied());
    }
}
