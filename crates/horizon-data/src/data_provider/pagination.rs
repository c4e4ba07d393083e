//! Pagination and sorting state forwarded to data provider queries.

use serde::{Deserialize, Serialize};

/// Default number of records per page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Zero-based page window.
///
/// A page size of 0 means "everything on one page".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Pagination {
    /// Current page, starting at 0.
    pub page: usize,
    /// Records per page.
    pub page_size: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// Pagination at page 0 with `page_size` records per page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self { page: 0, page_size }
    }

    /// Move to `page`.
    pub fn set_page(&mut self, page: usize) {
        self.page = page;
    }

    /// Change the page size; the current page is kept.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size;
    }

    /// Index of the first record of the current page.
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.page_size)
    }

    /// Maximum number of records on a page, `None` when unbounded.
    pub fn limit(&self) -> Option<usize> {
        (self.page_size > 0).then_some(self.page_size)
    }

    /// Number of pages needed for `total_count` records (at least one).
    pub fn page_count(&self, total_count: usize) -> usize {
        if self.page_size == 0 {
            return 1;
        }
        total_count.div_ceil(self.page_size).max(1)
    }
}

/// Direction of one sort order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// One attribute to sort by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortOrder {
    /// Attribute name.
    pub attribute: String,
    /// Direction.
    #[serde(default)]
    pub direction: SortDirection,
}

/// Ordered sort definition; earlier orders take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Sort {
    /// The orders.
    pub orders: Vec<SortOrder>,
}

impl Sort {
    /// Sort by `attribute` ascending, then by the orders already present.
    pub fn asc(attribute: impl Into<String>) -> Self {
        Self::default().then(attribute, SortDirection::Asc)
    }

    /// Sort by `attribute` descending.
    pub fn desc(attribute: impl Into<String>) -> Self {
        Self::default().then(attribute, SortDirection::Desc)
    }

    /// Append a lower-precedence order.
    pub fn then(mut self, attribute: impl Into<String>, direction: SortDirection) -> Self {
        self.orders.push(SortOrder {
            attribute: attribute.into(),
            direction,
        });
        self
    }

    /// Whether no order is defined.
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
