//! Offset/limit paging for catalog lists.

use serde::{Deserialize, Serialize};

/// Largest page a list query returns.
pub const MAX_PAGE_SIZE: usize = 10;

/// A clamped list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    offset: usize,
    limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: MAX_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Clamp raw values: negative offsets become 0, the limit is forced into
    /// `1..=MAX_PAGE_SIZE` and defaults to the maximum.
    pub fn new(offset: Option<i64>, limit: Option<i64>) -> Self {
        let offset = offset.unwrap_or(0).max(0) as usize;
        let limit = limit
            .unwrap_or(MAX_PAGE_SIZE as i64)
            .clamp(1, MAX_PAGE_SIZE as i64) as usize;
        Self { offset, limit }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Cut one page out of `items`, which must hold the full ordered result.
    pub fn apply<T: Clone>(&self, items: &[T]) -> Page<T> {
        let page: Vec<T> = items
            .iter()
            .skip(self.offset)
            .take(self.limit)
            .cloned()
            .collect();
        Page::new(page, items.len(), self.offset)
    }
}

/// One page of a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: usize, offset: usize) -> Self {
        let has_more = offset + items.len() < total;
        Self {
            items,
            total,
            has_more,
        }
    }
}
