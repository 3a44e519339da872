mod page_cache;
mod paginator;
mod window;


use std::{fmt, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

pub use page_cache::PageCache;
pub use paginator::{FirstWindow, Paginator, Window};
pub use window::{Segment, WindowGeometry};

/// Source page size of the card search endpoint.
pub const ITEMS_PER_PAGE: usize = 175;

/// Number of cards presented per sub-page.
pub const ITEMS_PER_SUB_PAGE: usize = 9;

/// Percent-encoded search query. Used verbatim as the `q` parameter and as
/// the outer cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Arc<str>);

impl QueryKey {
    pub fn encode(query: &str) -> Self {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One fetched page of the remote source.
#[derive(Clone, Debug)]
pub struct SourcePage<T> {
    pub items: Vec<T>,
    /// Total number of items for the whole query.
    pub total_items: usize,
    pub has_more: bool,
    pub next_page: Option<String>,
}

#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    /// Fetches one page. `source_page` is 1-based.
    async fn fetch_page(&self, query: &QueryKey, source_page: u32)
        -> Result<SourcePage<Self::Item>>;
}

#[async_trait]
impl<S: PageSource> PageSource for Arc<S> {
    type Item = S::Item;

    async fn fetch_page(
        &self,
        query: &QueryKey,
        source_page: u32,
    ) -> Result<SourcePage<Self::Item>> {
        (**self).fetch_page(query, source_page).await
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("source page size must be non-zero")]
    ZeroPageSize,
    #[error("sub-page size must be non-zero")]
    ZeroSubPageSize,
    #[error("sub-page size {items_per_sub_page} exceeds source page size {items_per_page}")]
    SubPageTooLarge {
        items_per_page: usize,
        items_per_sub_page: usize,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("query has no items")]
    EmptyQuery,
    #[error("page {page} of query {query} is malformed: {reason}")]
    MalformedPage {
        query: String,
        page: u32,
        reason: String,
    },
    #[error("items {start}..={end} out of range for page {page} holding {len} items")]
    SegmentOutOfRange {
        page: u32,
        start: usize,
        end: usize,
        len: usize,
    },
}
