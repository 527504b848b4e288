//! Validated page requests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Page size used when a caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Errors raised when a page request cannot be honoured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageRequestError {
    /// Page size was zero.
    #[error("page size must be at least 1")]
    ZeroSize,
}

/// Zero-based page number and page size.
///
/// ## Invariants
/// - `size` is at least 1. There is no upper bound; a size larger than the
///   collection yields a single page holding every element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPageRequest", into = "RawPageRequest")]
pub struct PageRequest {
    page: usize,
    size: usize,
}

impl PageRequest {
    /// Validate and construct a page request.
    ///
    /// # Errors
    ///
    /// Returns [`PageRequestError::ZeroSize`] when `size` is zero.
    ///
    /// # Examples
    /// ```
    /// use pagination::{PageRequest, PageRequestError};
    ///
    /// assert!(PageRequest::new(0, 10).is_ok());
    /// assert_eq!(PageRequest::new(0, 0), Err(PageRequestError::ZeroSize));
    /// ```
    pub const fn new(page: usize, size: usize) -> Result<Self, PageRequestError> {
        if size == 0 {
            return Err(PageRequestError::ZeroSize);
        }
        Ok(Self { page, size })
    }

    /// First page with the default size.
    #[must_use]
    pub const fn first() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Zero-based page number.
    #[must_use]
    pub const fn page(&self) -> usize {
        self.page
    }

    /// Number of elements per page.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Offset of the first element of this page, saturating on overflow.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }

    /// Request for the following page with the same size.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            size: self.size,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawPageRequest {
    page: usize,
    size: usize,
}

impl From<PageRequest> for RawPageRequest {
    fn from(value: PageRequest) -> Self {
        Self {
            page: value.page,
            size: value.size,
        }
    }
}

impl TryFrom<RawPageRequest> for PageRequest {
    type Error = PageRequestError;

    fn try_from(value: RawPageRequest) -> Result<Self, Self::Error> {
        Self::new(value.page, value.size)
    }
}

#[cfg(test)]
mod tests {
    //! Validation rules for page requests.
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1)]
    #[case(3, 10)]
    #[case(0, 1001)]
    #[case(usize::MAX, usize::MAX)]
    fn accepts_any_positive_size(#[case] page: usize, #[case] size: usize) {
        let request = PageRequest::new(page, size).expect("positive size");
        assert_eq!(request.page(), page);
        assert_eq!(request.size(), size);
    }

    #[rstest]
    fn rejects_zero_size() {
        assert_eq!(PageRequest::new(0, 0), Err(PageRequestError::ZeroSize));
    }

    #[rstest]
    fn offset_saturates_instead_of_overflowing() {
        let request = PageRequest::new(usize::MAX, 10).expect("valid request");
        assert_eq!(request.offset(), usize::MAX);
    }

    #[rstest]
    fn default_is_first_page_of_ten() {
        let request = PageRequest::default();
        assert_eq!((request.page(), request.size()), (0, DEFAULT_PAGE_SIZE));
        assert_eq!(request.next().page(), 1);
    }

    #[rstest]
    fn deserialisation_applies_validation() {
        let err = serde_json::from_str::<PageRequest>(r#"{"page":0,"size":0}"#)
            .expect_err("zero size rejected");
        assert!(err.to_string().contains("at least 1"));

        let request: PageRequest =
            serde_json::from_str(r#"{"page":4,"size":25}"#).expect("valid payload");
        assert_eq!(request, PageRequest::new(4, 25).expect("valid request"));
    }
}
