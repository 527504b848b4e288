//! Page envelope and slicing.

use serde::{Deserialize, Serialize};

use crate::PageRequest;

/// One page of an ordered collection together with collection totals.
///
/// Serialises as `{"content": [...], "page": n, "size": s, "pages": p,
/// "total": t}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    content: Vec<T>,
    page: usize,
    size: usize,
    #[serde(rename = "pages")]
    total_pages: usize,
    #[serde(rename = "total")]
    total_elements: usize,
}

impl<T> Page<T> {
    /// Cut the page described by `request` out of `ordered`.
    ///
    /// Pages beyond the last one are empty but still report the collection
    /// totals.
    #[must_use]
    pub fn slice(ordered: &[T], request: PageRequest) -> Self
    where
        T: Clone,
    {
        let total_elements = ordered.len();
        let start = request.offset().min(total_elements);
        let end = start.saturating_add(request.size()).min(total_elements);
        let content = ordered.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
        Self {
            content,
            page: request.page(),
            size: request.size(),
            total_pages: total_elements.div_ceil(request.size()),
            total_elements,
        }
    }

    /// Elements on this page.
    #[must_use]
    pub fn content(&self) -> &[T] {
        &self.content
    }

    /// Consume the page, returning its elements.
    #[must_use]
    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    /// Zero-based page number.
    #[must_use]
    pub const fn page(&self) -> usize {
        self.page
    }

    /// Requested page size.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Number of pages in the collection; zero when the collection is empty.
    #[must_use]
    pub const fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Number of elements in the collection.
    #[must_use]
    pub const fn total_elements(&self) -> usize {
        self.total_elements
    }

    /// Whether this page holds any elements.
    #[must_use]
    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    /// Whether no page follows this one.
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.page.saturating_add(1) >= self.total_pages
    }

    /// Transform every element, keeping the totals.
    #[must_use]
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_pages: self.total_pages,
            total_elements: self.total_elements,
        }
    }

    /// Replace the content with `content`, keeping position and totals.
    ///
    /// Used when the sliced elements are keys and the page should carry
    /// whatever was loaded for them.
    #[must_use]
    pub fn with_content<U>(self, content: Vec<U>) -> Page<U> {
        Page {
            content,
            page: self.page,
            size: self.size,
            total_pages: self.total_pages,
            total_elements: self.total_elements,
        }
    }

    /// Fallible [`Page::map`]; stops at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`.
    pub fn try_map<U, E, F>(self, f: F) -> Result<Page<U>, E>
    where
        F: FnMut(T) -> Result<U, E>,
    {
        let content = self.content.into_iter().map(f).collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            content,
            page: self.page,
            size: self.size,
            total_pages: self.total_pages,
            total_elements: self.total_elements,
        })
    }
}
