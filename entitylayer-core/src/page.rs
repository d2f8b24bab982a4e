//! Pagination and result types for managing query results.
//!
//! This module provides the [`PageRequest`] struct for specifying which slice
//! of an ordered result to fetch and the [`Page`] struct returned by
//! [`TypedCollection::find_page`](crate::collection::TypedCollection::find_page).
//!
//! Pages are 0-indexed: page 0 with size N holds the first N matches.

use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// A single page of paginated results.
///
/// This struct represents a subset of results from a larger dataset,
/// along with metadata for navigating through the pages.
///
/// # Type Parameters
///
/// * `T` - The type of items contained in this page
///
/// # Example
///
/// ```ignore
/// use entitylayer::page::{Page, PageRequest};
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_request(PageRequest::new(0, 10))
///     .with_total_elements(100)
///     .build();
///
/// assert_eq!(page.page_size, 1);
/// assert_eq!(page.total_pages, 10);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// The 0-based index of this page.
    pub page: usize,
    /// Number of items on this page.
    pub page_size: usize,
    /// Number of pages needed to hold every match at the requested size.
    pub total_pages: usize,
    /// Total count of matches across all pages, taken before the fetch.
    pub total_elements: u64,
}

impl<T> Page<T> {
    /// Creates a new builder for constructing a page with custom settings.
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }

    /// Converts the items of this page, keeping its metadata.
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            total_elements: self.total_elements,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a page after this one holds any items.
    pub fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            page: 0,
            page_size: 0,
            total_pages: 0,
            total_elements: 0,
        }
    }
}

/// Builder for constructing [`Page`] instances with fluent API.
pub struct PageBuilder<T> {
    items: Vec<T>,
    request: PageRequest,
    total_elements: u64,
}

impl<T> PageBuilder<T> {
    /// Creates a new builder with the given items.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            request: PageRequest::default(),
            total_elements: 0,
        }
    }

    /// Sets the request this page answers.
    pub fn with_request(mut self, request: PageRequest) -> Self {
        self.request = request;
        self
    }

    /// Sets the total count of items across all pages.
    pub fn with_total_elements(mut self, total_elements: u64) -> Self {
        self.total_elements = total_elements;
        self
    }

    /// Builds and returns the final [`Page`] instance.
    pub fn build(self) -> Page<T> {
        let size = self.request.size.max(1) as u64;

        Page {
            page_size: self.items.len(),
            items: self.items,
            page: self.request.page,
            total_pages: self.total_elements.div_ceil(size) as usize,
            total_elements: self.total_elements,
        }
    }
}

/// Which page to fetch and how many items it holds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// The page number (0-indexed).
    pub page: usize,
    /// Number of items per page. Must be positive.
    pub size: usize,
}

impl PageRequest {
    pub fn new(page: usize, size: usize) -> Self {
        Self { page, size }
    }

    /// Checks signed page parameters as they arrive from callers.
    pub fn try_new(page: i64, size: i64) -> DocumentStoreResult<Self> {
        if page < 0 {
            return Err(DocumentStoreError::validation(format!(
                "page must be zero or greater, got {page}"
            )));
        }
        if size <= 0 {
            return Err(DocumentStoreError::validation(format!(
                "page size must be positive, got {size}"
            )));
        }

        Ok(Self { page: page as usize, size: size as usize })
    }

    pub fn validate(&self) -> DocumentStoreResult<()> {
        if self.size == 0 {
            return Err(DocumentStoreError::validation("page size must be positive"));
        }

        Ok(())
    }

    /// Calculates the offset (number of items to skip) for this page.
    ///
    /// ```ignore
    /// let request = PageRequest::new(3, 20);
    /// assert_eq!(request.offset(), 60);
    /// ```
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 0, size: 20 }
    }
}
