//! Page results.

use serde::Serialize;

/// A page of results with the total row count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginator<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
}

impl<T> Paginator<T> {
    pub fn new(items: Vec<T>, total: u64, per_page: u64, current_page: u64) -> Self {
        Self {
            items,
            total,
            per_page: per_page.max(1),
            current_page: current_page.max(1),
        }
    }

    /// Last page number (at least 1).
    pub fn last_page(&self) -> u64 {
        self.total.div_ceil(self.per_page).max(1)
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 1-based index of the first item on this page, if any.
    pub fn first_item(&self) -> Option<u64> {
        (!self.items.is_empty()).then(|| {
            (self.current_page - 1)
                .saturating_mul(self.per_page)
                .saturating_add(1)
        })
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Paginator<U> {
        Paginator {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
        }
    }
}

/// A page of results without a total; `has_more` comes from fetching one extra row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimplePaginator<T> {
    pub items: Vec<T>,
    pub per_page: u64,
    pub current_page: u64,
    pub has_more: bool,
}

impl<T> SimplePaginator<T> {
    /// Build from up to `per_page + 1` fetched rows; the surplus row is dropped.
    pub fn from_overfetch(mut items: Vec<T>, per_page: u64, current_page: u64) -> Self {
        let per_page = per_page.max(1);
        let has_more = items.len() as u64 > per_page;
        items.truncate(usize::try_from(per_page).unwrap_or(usize::MAX));
        Self {
            items,
            per_page,
            current_page: current_page.max(1),
            has_more,
        }
    }

    pub fn has_more_pages(&self) -> bool {
        self.has_more
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> SimplePaginator<U> {
        SimplePaginator {
            items: self.items.into_iter().map(f).collect(),
            per_page: self.per_page,
            current_page: self.current_page,
            has_more: self.has_more,
        }
    }
}
