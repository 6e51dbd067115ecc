//! Workout catalog: paging and the content store boundary.

pub mod pagination;
pub mod store;

pub use pagination::{Page, PageRequest, MAX_PAGE_SIZE};
pub use store::{CatalogError, ContentStore, InMemoryContentStore};
