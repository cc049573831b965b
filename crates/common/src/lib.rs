//! Types shared by every layer of the customer event-sourcing core.

mod paging;
mod types;

pub use paging::{MAX_PAGE_SIZE, Page, PageRequest, PagingError};
pub use types::AggregateId;
