use crate::{GeometryError, PaginationError, ITEMS_PER_PAGE, ITEMS_PER_SUB_PAGE};

/// Source page size and sub-page size. A sub-page never spans more than two
/// source pages, so the sub-page size is bounded by the page size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowGeometry {
    items_per_page: usize,
    items_per_sub_page: usize,
}

/// Inclusive item range `[start_index, end_index]` within one source page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub page: u32,
    pub start_index: usize,
    pub end_index: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end_index + 1 - self.start_index
    }

    pub fn is_empty(&self) -> bool {
        self.end_index < self.start_index
    }
}

impl Default for WindowGeometry {
    fn default() -> Self {
        Self {
            items_per_page: ITEMS_PER_PAGE,
            items_per_sub_page: ITEMS_PER_SUB_PAGE,
        }
    }
}

impl WindowGeometry {
    pub fn new(items_per_page: usize, items_per_sub_page: usize) -> Result<Self, GeometryError> {
        if items_per_page == 0 {
            return Err(GeometryError::ZeroPageSize);
        }
        if items_per_sub_page == 0 {
            return Err(GeometryError::ZeroSubPageSize);
        }
        if items_per_sub_page > items_per_page {
            return Err(GeometryError::SubPageTooLarge {
                items_per_page,
                items_per_sub_page,
            });
        }
        Ok(Self {
            items_per_page,
            items_per_sub_page,
        })
    }

    pub fn items_per_page(&self) -> usize {
        self.items_per_page
    }

    pub fn items_per_sub_page(&self) -> usize {
        self.items_per_sub_page
    }

    pub fn sub_page_count(&self, total_items: usize) -> usize {
        (total_items + self.items_per_sub_page - 1) / self.items_per_sub_page
    }

    pub fn page_of(&self, item: usize) -> u32 {
        (item / self.items_per_page) as u32
    }

    fn first_item(&self, sub_page: usize, total_items: usize) -> usize {
        sub_page
            .saturating_mul(self.items_per_sub_page)
            .min(total_items - 1)
    }

    fn last_item(&self, sub_page: usize, total_items: usize) -> usize {
        (self.first_item(sub_page, total_items) + self.items_per_sub_page - 1).min(total_items - 1)
    }

    /// Maps a sub-page to the source page ranges that make it up, in item
    /// order. Sub-pages past the end collapse onto the final item.
    pub fn segments(
        &self,
        sub_page: usize,
        total_items: usize,
    ) -> Result<Vec<Segment>, PaginationError> {
        if total_items == 0 {
            return Err(PaginationError::EmptyQuery);
        }

        let first = self.first_item(sub_page, total_items);
        let last = self.last_item(sub_page, total_items);
        let page = self.page_of(first);
        let start_index = first % self.items_per_page;

        if page == self.page_of(last) {
            return Ok(vec![Segment {
                page,
                start_index,
                end_index: last % self.items_per_page,
            }]);
        }

        // Crosses a seam: the left range runs to the end of its page and the
        // right range fills what is left of the sub-page.
        let left = Segment {
            page,
            start_index,
            end_index: self.items_per_page - 1,
        };
        let remaining = self.items_per_sub_page - left.len();
        let right = Segment {
            page: page + 1,
            start_index: 0,
            end_index: (remaining - 1).min(last % self.items_per_page),
        };
        Ok(vec![left, right])
    }
}
