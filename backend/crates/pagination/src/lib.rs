//! Offset pagination primitives shared by the bookstore record store.
//!
//! A [`PageRequest`] validates a zero-based page number and a page size. A
//! [`Page`] is the envelope returned to callers: the slice for the requested
//! page plus the totals needed to render navigation.
//!
//! The pager never orders anything itself. Callers pass an already ordered
//! collection and the pager only slices it.
//!
//! # Example
//!
//! ```
//! use pagination::{Page, PageRequest};
//!
//! let ids: Vec<u32> = (0..25).collect();
//! let request = PageRequest::new(2, 10).expect("valid request");
//! let page = Page::slice(&ids, request);
//!
//! assert_eq!(page.content(), &[20, 21, 22, 23, 24]);
//! assert_eq!(page.total_pages(), 3);
//! assert_eq!(page.total_elements(), 25);
//! ```

mod page;
mod request;

pub use page::Page;
pub use request::{DEFAULT_PAGE_SIZE, PageRequest, PageRequestError};
