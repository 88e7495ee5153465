//! Marker-based pagination

use crate::error::{ApiError, EngineError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// One page of a marker-paginated list response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Marker to pass to the next fetch
    pub next_marker: String,

    /// Whether more pages follow
    pub is_truncated: bool,
}

impl<T> Page<T> {
    /// The final page of a listing
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_marker: String::new(),
            is_truncated: false,
        }
    }

    pub fn truncated(items: Vec<T>, next_marker: impl Into<String>) -> Self {
        Self {
            items,
            next_marker: next_marker.into(),
            is_truncated: true,
        }
    }
}

/// Drain a paginated listing into one collection, in page arrival order.
///
/// The first fetch gets an empty marker. Any failed page aborts the whole
/// collection; partial results are never returned.
pub async fn collect<T, F, Fut>(operation: &str, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut marker = String::new();
    let mut pages = 0usize;

    loop {
        let page = fetch(marker).await?;
        pages += 1;
        tracing::debug!(
            "{}: page {} returned {} items (truncated: {})",
            operation,
            pages,
            page.items.len(),
            page.is_truncated
        );
        items.extend(page.items);

        if !page.is_truncated {
            return Ok(items);
        }
        if page.next_marker.is_empty() {
            return Err(EngineError::Upstream {
                operation: operation.to_string(),
                resource_id: format!("page {}", pages),
                source: ApiError::new(
                    None,
                    "MissingMarker",
                    "truncated page carried no continuation marker",
                ),
            });
        }
        marker = page.next_marker;
    }
}
