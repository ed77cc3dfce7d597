//! Ledger loading
//!
//! Pages through the ledger table and drops rows whose classification
//! column mentions the exclusion keyword. The keyword test is one
//! [`ExclusionFilter`] used both to build the server-side filter and to
//! check every returned row, so the two can never disagree.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::entities::ledger_account::{text_field, LedgerAccount, LedgerColumns};
use crate::domain::errors::{BackendError, CycleError};
use crate::domain::repositories::rest_backend::{RestBackend, SelectQuery};

/// Case-insensitive "does not mention the keyword" predicate on one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionFilter {
    column: String,
    keyword: String,
}

impl ExclusionFilter {
    pub fn new(column: &str, keyword: &str) -> Self {
        Self {
            column: column.to_string(),
            keyword: keyword.trim().to_lowercase(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.keyword.is_empty()
    }

    /// Whether a row survives the filter. Rows without the column are kept.
    pub fn keeps(&self, row: &Value) -> bool {
        if !self.is_active() {
            return true;
        }
        match text_field(row, &self.column) {
            Some(text) => !text.to_lowercase().contains(&self.keyword),
            None => true,
        }
    }

    /// PostgREST expression with the same meaning as [`Self::keeps`]:
    /// null classification, or no case-insensitive match
    pub fn server_filter(&self) -> Option<(String, String)> {
        if !self.is_active() {
            return None;
        }
        Some((
            "or".to_string(),
            format!(
                "({col}.is.null,{col}.not.ilike.*{kw}*)",
                col = self.column,
                kw = self.keyword
            ),
        ))
    }
}

/// Ledger pagination settings
#[derive(Debug, Clone)]
pub struct LedgerSource {
    pub table: String,
    pub columns: LedgerColumns,
    pub page_size: usize,
    pub hard_limit: Option<usize>,
    pub exclude_keyword: String,
}

pub struct LedgerLoader {
    backend: Arc<dyn RestBackend>,
    source: LedgerSource,
    filter: ExclusionFilter,
}

impl LedgerLoader {
    pub fn new(backend: Arc<dyn RestBackend>, source: LedgerSource) -> Self {
        let filter = ExclusionFilter::new(&source.columns.temp_name, &source.exclude_keyword);
        Self {
            backend,
            source,
            filter,
        }
    }

    pub fn filter(&self) -> &ExclusionFilter {
        &self.filter
    }

    /// Load every ledger account that passes the exclusion filter.
    ///
    /// The server-side filter is tried first. If any filtered page fails,
    /// the whole load restarts unfiltered so offsets stay consistent; the
    /// client-side check applies on both paths.
    pub async fn load(&self) -> Result<Vec<LedgerAccount>, CycleError> {
        let rows = match self.filter.server_filter() {
            Some(server_filter) => match self.load_pages(Some(&server_filter)).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(
                        "Server-side ledger filter failed ({}); falling back to client-side filtering",
                        e
                    );
                    self.load_pages(None)
                        .await
                        .map_err(CycleError::LedgerUnavailable)?
                }
            },
            None => self
                .load_pages(None)
                .await
                .map_err(CycleError::LedgerUnavailable)?,
        };

        if rows.is_empty() {
            warn!(
                "Ledger table '{}' returned 0 rows after filter",
                self.source.table
            );
        } else {
            info!("Ledger loaded: {} rows after exclusion filter", rows.len());
        }

        Ok(rows
            .iter()
            .map(|row| LedgerAccount::from_row(row, &self.source.columns))
            .collect())
    }

    async fn load_pages(
        &self,
        server_filter: Option<&(String, String)>,
    ) -> Result<Vec<Value>, BackendError> {
        let page_size = self.source.page_size.max(1);
        let mut base = SelectQuery::new(&self.source.columns.select_list());
        if let Some((column, expr)) = server_filter {
            base = base.filter(column, expr);
        }

        let mut rows = Vec::new();
        let mut offset = 0;
        loop {
            let query = base.clone().limit(page_size).offset(offset);
            let chunk = self.backend.select(&self.source.table, &query).await?;
            if chunk.is_empty() {
                break;
            }
            let fetched = chunk.len();
            rows.extend(chunk.into_iter().filter(|row| self.filter.keeps(row)));
            info!("Ledger chunk: {} rows (total kept {})", fetched, rows.len());

            if let Some(limit) = self.source.hard_limit {
                if rows.len() >= limit {
                    rows.truncate(limit);
                    break;
                }
            }
            offset += page_size;
        }
        Ok(rows)
    }
}
