use std::time::Instant;

use crate::backend::{BackendError, ViewportBackend};
use crate::dialect::{PageQuery, TableRef};

/// One loaded page together with the filtered row total.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub generation: u64,
    pub table: TableRef,
    pub query: PageQuery,
}

/// Outcome of a [`FetchRequest`], stamped with the generation it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub generation: u64,
    pub outcome: Result<PageData, BackendError>,
}

/// Counts the filtered rows, then loads the requested page.
///
/// Failures are folded into the returned message so the caller can post it
/// across a channel unchanged.
pub async fn execute_fetch<B>(backend: &B, request: FetchRequest) -> FetchResult
where
    B: ViewportBackend + ?Sized,
{
    let FetchRequest {
        generation,
        table,
        query,
    } = request;
    let started_at = Instant::now();
    let outcome = load_page(backend, &table, &query).await;

    match &outcome {
        Ok(page) => tracing::debug!(
            generation,
            table = %table,
            rows = page.rows.len(),
            total_rows = page.total_rows,
            elapsed_ms = started_at.elapsed().as_millis(),
            "page fetched"
        ),
        Err(error) => tracing::warn!(generation, table = %table, %error, "page fetch failed"),
    }

    FetchResult {
        generation,
        outcome,
    }
}

async fn load_page<B>(
    backend: &B,
    table: &TableRef,
    query: &PageQuery,
) -> Result<PageData, BackendError>
where
    B: ViewportBackend + ?Sized,
{
    let kind = backend.kind();
    let count_sql = kind.count_sql(table, &query.columns, query.filter.as_deref());
    let total_rows = backend.count_rows(&count_sql).await?;

    let page_sql = kind.page_sql(table, query);
    let row_set = backend.fetch_rows(&page_sql).await?;

    Ok(PageData {
        columns: row_set.columns,
        rows: row_set.rows,
        total_rows,
    })
}
