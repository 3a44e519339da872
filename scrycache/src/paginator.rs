use anyhow::Result;
use futures::future::try_join_all;

use crate::{PageCache, PageSource, PaginationError, QueryKey, WindowGeometry};

/// Items of one sub-page.
#[derive(Clone, Debug)]
pub struct Window<T> {
    pub items: Vec<T>,
    pub sub_page_count: usize,
}

/// The first sub-page of a query, along with the query's total.
#[derive(Clone, Debug)]
pub struct FirstWindow<T> {
    pub items: Vec<T>,
    pub total_items: usize,
    pub sub_page_count: usize,
}

/// Assembles sub-pages out of cached source pages.
pub struct Paginator<S: PageSource> {
    cache: PageCache<S>,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S, geometry: WindowGeometry) -> Self {
        Self {
            cache: PageCache::new(source, geometry),
        }
    }

    pub fn cache(&self) -> &PageCache<S> {
        &self.cache
    }

    pub fn geometry(&self) -> WindowGeometry {
        self.cache.geometry()
    }

    pub async fn window(
        &self,
        sub_page: usize,
        query: &QueryKey,
        total_items: usize,
    ) -> Result<Window<S::Item>> {
        let geometry = self.geometry();
        let segments = geometry.segments(sub_page, total_items)?;

        // try_join_all yields in input order regardless of completion order.
        let pages = try_join_all(
            segments
                .iter()
                .map(|segment| self.cache.get_page(query, segment.page)),
        )
        .await?;

        let mut items = Vec::with_capacity(geometry.items_per_sub_page());
        for (segment, page) in segments.iter().zip(pages.iter()) {
            let slice = page
                .items
                .get(segment.start_index..=segment.end_index)
                .ok_or(PaginationError::SegmentOutOfRange {
                    page: segment.page,
                    start: segment.start_index,
                    end: segment.end_index,
                    len: page.items.len(),
                })?;
            items.extend_from_slice(slice);
        }

        tracing::debug!(
            query = %query,
            sub_page,
            segments = segments.len(),
            items = items.len(),
            "assembled window"
        );
        Ok(Window {
            items,
            sub_page_count: geometry.sub_page_count(total_items),
        })
    }

    pub async fn first_window(&self, query: &QueryKey) -> Result<FirstWindow<S::Item>> {
        let geometry = self.geometry();
        let first = self.cache.get_first_page(query).await?;
        let total_items = first.total_items;
        let sub_page_count = geometry.sub_page_count(total_items);

        if total_items <= geometry.items_per_sub_page() {
            return Ok(FirstWindow {
                items: first.items.clone(),
                total_items,
                sub_page_count,
            });
        }

        let window = self.window(0, query, total_items).await?;
        Ok(FirstWindow {
            items: window.items,
            total_items,
            sub_page_count,
        })
    }
}
