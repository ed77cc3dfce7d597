//! REST Backend Trait
//!
//! Table-level operations against a PostgREST-compatible backend. The ledger
//! loader, the cycle service and the read API only see this trait, which
//! keeps them testable without a live backend.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::BackendError;

/// Common result type for backend reads
pub type BackendResult<T> = Result<T, BackendError>;

/// Sort direction for an `order` clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One `order` term, e.g. `pct_display.desc.nullslast`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
    pub nulls_last: bool,
}

impl OrderBy {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: SortDirection::Asc,
            nulls_last: false,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: SortDirection::Desc,
            nulls_last: false,
        }
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls_last = true;
        self
    }

    pub fn to_param(&self) -> String {
        let dir = match self.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        if self.nulls_last {
            format!("{}.{}.nullslast", self.column, dir)
        } else {
            format!("{}.{}", self.column, dir)
        }
    }
}

/// A SELECT request. Filters use PostgREST operator syntax as values,
/// e.g. `("account_id", "eq.123")`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectQuery {
    pub columns: String,
    pub filters: Vec<(String, String)>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SelectQuery {
    pub fn new(columns: &str) -> Self {
        Self {
            columns: columns.to_string(),
            ..Self::default()
        }
    }

    pub fn filter(mut self, column: &str, expr: &str) -> Self {
        self.filters.push((column.to_string(), expr.to_string()));
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Query-string pairs in a stable order
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(OrderBy::to_param)
                .collect::<Vec<_>>()
                .join(",");
            params.push(("order".to_string(), order));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        params.extend(self.filters.iter().cloned());
        params
    }
}

/// Result of a write that is never propagated as an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// Failed after retries; the failure has already been logged
    Failed,
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }
}

#[async_trait]
pub trait RestBackend: Send + Sync {
    /// One page of rows. An empty-result status is an empty page, not an
    /// error. Fails after transient retries are exhausted.
    async fn select(&self, table: &str, query: &SelectQuery) -> BackendResult<Vec<Value>>;

    /// Insert or merge one row on the given conflict columns. Failures are
    /// logged and reported as [`WriteOutcome::Failed`].
    async fn upsert(&self, table: &str, row: &Value, conflict_columns: &[&str]) -> WriteOutcome;

    /// Delete all rows matching the filters. Failures are logged and
    /// reported as [`WriteOutcome::Failed`].
    async fn delete(&self, table: &str, filters: &[(String, String)]) -> WriteOutcome;

    /// All rows, paging with `page_size` until a short or empty page
    async fn select_all(
        &self,
        table: &str,
        query: &SelectQuery,
        page_size: usize,
    ) -> BackendResult<Vec<Value>> {
        let page_size = page_size.max(1);
        let mut rows = Vec::new();
        let mut offset = 0;
        loop {
            let page_query = query.clone().limit(page_size).offset(offset);
            let chunk = self.select(table, &page_query).await?;
            let len = chunk.len();
            rows.extend(chunk);
            if len < page_size {
                break;
            }
            offset += page_size;
        }
        Ok(rows)
    }
}
