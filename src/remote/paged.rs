//! Offset/limit pagination cursor
//!
//! Pages are requested until one comes back shorter than the page size, the
//! page-iteration cap is hit, or enough rows have been collected that further
//! pages cannot matter. An error mid-stream ends the cursor but keeps whatever
//! was already fetched.

use tracing::{debug, warn};

use super::{RemoteRequest, RemoteRow, RemoteSource};
use crate::config::{DEFAULT_PAGE_SIZE, MAX_PAGE_ITERATIONS, MAX_REMOTE_ROWS};
use crate::error::{RemoteError, RemoteResult};

/// Why a cursor stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStop {
    /// A page came back shorter than the page size
    Exhausted,
    PageCap,
    RowCap,
    Failed,
}

/// Everything a cursor collected
#[derive(Debug)]
pub struct PagedRows {
    pub rows: Vec<RemoteRow>,
    pub pages: usize,
    pub stop: PageStop,
    pub error: Option<RemoteError>,
}

pub struct PagedFetch<'a> {
    source: &'a dyn RemoteSource,
    table: &'a str,
    request: RemoteRequest,
    page_size: usize,
    max_pages: usize,
    max_rows: usize,
    offset: usize,
    pages: usize,
    rows_seen: usize,
    stop: Option<PageStop>,
}

impl<'a> PagedFetch<'a> {
    pub fn new(source: &'a dyn RemoteSource, table: &'a str, request: RemoteRequest) -> Self {
        Self {
            source,
            table,
            request,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: MAX_PAGE_ITERATIONS,
            max_rows: MAX_REMOTE_ROWS,
            offset: 0,
            pages: 0,
            rows_seen: 0,
            stop: None,
        }
    }

    pub fn with_limits(mut self, page_size: usize, max_pages: usize, max_rows: usize) -> Self {
        self.page_size = page_size.max(1);
        self.max_pages = max_pages;
        self.max_rows = max_rows;
        self
    }

    /// Fetch the next page, or `None` once the cursor has stopped
    pub async fn next_page(&mut self) -> Option<RemoteResult<Vec<RemoteRow>>> {
        if self.stop.is_some() {
            return None;
        }
        if self.pages >= self.max_pages {
            warn!(
                "Reached max pages ({}) for table {}, stopping with {} rows",
                self.max_pages, self.table, self.rows_seen
            );
            self.stop = Some(PageStop::PageCap);
            return None;
        }
        if self.rows_seen >= self.max_rows {
            debug!(
                "Row cap ({}) reached for table {} after {} pages",
                self.max_rows, self.table, self.pages
            );
            self.stop = Some(PageStop::RowCap);
            return None;
        }

        let request = self.request.page(self.offset, self.page_size);
        match self.source.fetch(self.table, &request).await {
            Ok(rows) => {
                self.pages += 1;
                self.offset += self.page_size;
                self.rows_seen += rows.len();
                if rows.len() < self.page_size {
                    self.stop = Some(PageStop::Exhausted);
                }
                Some(Ok(rows))
            }
            Err(e) => {
                self.stop = Some(PageStop::Failed);
                Some(Err(e))
            }
        }
    }

    /// Drain the cursor
    pub async fn collect_all(mut self) -> PagedRows {
        let mut rows = Vec::new();
        let mut error = None;
        while let Some(page) = self.next_page().await {
            match page {
                Ok(mut page) => rows.append(&mut page),
                Err(e) => error = Some(e),
            }
        }
        PagedRows {
            rows,
            pages: self.pages,
            stop: self.stop.unwrap_or(PageStop::Exhausted),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteSource;
    use serde_json::json;

    fn rows(n: usize) -> Vec<RemoteRow> {
        (0..n)
            .map(|i| {
                json!({"ISIN": format!("COB{:09}", i), "FECHA_VALORACION": "2025-06-03"})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_stops_on_short_page() {
        let source = MemoryRemoteSource::new().with_table("BD_PIP", rows(25));
        let paged = PagedFetch::new(&source, "BD_PIP", RemoteRequest::default())
            .with_limits(10, 20, 10_000)
            .collect_all()
            .await;
        assert_eq!(paged.rows.len(), 25);
        assert_eq!(paged.pages, 3);
        assert_eq!(paged.stop, PageStop::Exhausted);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_one_empty_page() {
        let source = MemoryRemoteSource::new().with_table("BD_PIP", rows(20));
        let paged = PagedFetch::new(&source, "BD_PIP", RemoteRequest::default())
            .with_limits(10, 20, 10_000)
            .collect_all()
            .await;
        assert_eq!(paged.rows.len(), 20);
        assert_eq!(paged.pages, 3);
    }

    #[tokio::test]
    async fn test_page_cap() {
        let source = MemoryRemoteSource::new().with_table("BD_PIP", rows(100));
        let paged = PagedFetch::new(&source, "BD_PIP", RemoteRequest::default())
            .with_limits(10, 3, 10_000)
            .collect_all()
            .await;
        assert_eq!(paged.rows.len(), 30);
        assert_eq!(paged.stop, PageStop::PageCap);
    }

    #[tokio::test]
    async fn test_row_cap() {
        let source = MemoryRemoteSource::new().with_table("BD_PIP", rows(100));
        let paged = PagedFetch::new(&source, "BD_PIP", RemoteRequest::default())
            .with_limits(10, 20, 25)
            .collect_all()
            .await;
        assert_eq!(paged.rows.len(), 30);
        assert_eq!(paged.stop, PageStop::RowCap);
    }

    #[tokio::test]
    async fn test_error_mid_stream_keeps_pages() {
        let source = MemoryRemoteSource::new()
            .with_table("BD_PIP", rows(100))
            .failing_after("BD_PIP", 2);
        let paged = PagedFetch::new(&source, "BD_PIP", RemoteRequest::default())
            .with_limits(10, 20, 10_000)
            .collect_all()
            .await;
        assert_eq!(paged.rows.len(), 20);
        assert_eq!(paged.pages, 2);
        assert_eq!(paged.stop, PageStop::Failed);
        assert!(paged.error.is_some());
    }
}
