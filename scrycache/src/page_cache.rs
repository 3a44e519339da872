use std::{error::Error, fmt, sync::Arc};

use anyhow::{Context, Result};
use moka::future::Cache;

use crate::{PageSource, PaginationError, QueryKey, SourcePage, WindowGeometry};

/// Process-wide store of fetched source pages, keyed by query and zero-based
/// page number. Entries are only ever added by a successful fetch and live
/// until `clear`.
pub struct PageCache<S: PageSource> {
    source: S,
    geometry: WindowGeometry,
    pages: Cache<(QueryKey, u32), Arc<SourcePage<S::Item>>>,
}

impl<S: PageSource> PageCache<S> {
    pub fn new(source: S, geometry: WindowGeometry) -> Self {
        Self {
            source,
            geometry,
            pages: Cache::builder().build(),
        }
    }

    pub fn geometry(&self) -> WindowGeometry {
        self.geometry
    }

    pub fn contains(&self, query: &QueryKey, page: u32) -> bool {
        self.pages.contains_key(&(query.clone(), page))
    }

    pub async fn get_page(
        &self,
        query: &QueryKey,
        page: u32,
    ) -> Result<Arc<SourcePage<S::Item>>> {
        let key = (query.clone(), page);
        if let Some(x) = self.pages.get(&key) {
            tracing::debug!(query = %query, page, "using cached page");
            return Ok(x);
        }

        let res = self.pages.try_get_with(key, self.load(query, page)).await;
        flatten_get_output(res)
    }

    pub async fn get_first_page(&self, query: &QueryKey) -> Result<Arc<SourcePage<S::Item>>> {
        self.get_page(query, 0).await
    }

    /// Number of sub-pages for `query`, or `None` until its first page has
    /// been cached.
    pub fn sub_page_count(&self, query: &QueryKey) -> Option<usize> {
        self.pages
            .get(&(query.clone(), 0))
            .map(|first| self.geometry.sub_page_count(first.total_items))
    }

    pub fn clear(&self) {
        tracing::info!("clearing page cache");
        self.pages.invalidate_all();
    }

    async fn load(&self, query: &QueryKey, page: u32) -> Result<Arc<SourcePage<S::Item>>> {
        tracing::info!(query = %query, page, "fetching source page");
        let fetched = self
            .source
            .fetch_page(query, page + 1)
            .await
            .with_context(|| format!("failed to fetch page {} of query {}", page, query))?;
        self.validate(query, page, &fetched)?;
        Ok(Arc::new(fetched))
    }

    fn validate(
        &self,
        query: &QueryKey,
        page: u32,
        fetched: &SourcePage<S::Item>,
    ) -> Result<(), PaginationError> {
        let malformed = |reason: String| PaginationError::MalformedPage {
            query: query.to_string(),
            page,
            reason,
        };

        if fetched.items.is_empty() {
            return Err(malformed("page has no items".into()));
        }
        if fetched.items.len() > self.geometry.items_per_page() {
            return Err(malformed(format!(
                "page holds {} items, more than the page size {}",
                fetched.items.len(),
                self.geometry.items_per_page()
            )));
        }

        if page != 0 {
            if let Some(first) = self.pages.get(&(query.clone(), 0)) {
                if first.total_items != fetched.total_items {
                    tracing::warn!(
                        query = %query,
                        page,
                        first_page_total = first.total_items,
                        total = fetched.total_items,
                        "source reported a different total for the same query"
                    );
                }
            }
        }
        Ok(())
    }
}

/// Load error observed by more than one waiter of the same entry.
#[derive(Debug)]
struct SharedLoadError(Arc<anyhow::Error>);

impl fmt::Display for SharedLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for SharedLoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        let inner: &(dyn Error + Send + Sync + 'static) = (*self.0).as_ref();
        Some(inner)
    }
}

fn flatten_get_output<T>(res: Result<T, Arc<anyhow::Error>>) -> Result<T> {
    match res {
        Ok(val) => Ok(val),
        Err(e) => match Arc::try_unwrap(e) {
            Ok(e) => Err(e),
            Err(shared) => Err(SharedLoadError(shared).into()),
        },
    }
}
