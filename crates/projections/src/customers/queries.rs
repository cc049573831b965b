use async_trait::async_trait;
use chrono::NaiveDate;
use common::{AggregateId, Page, PageRequest};

use super::CustomerReadModel;
use crate::Result;

/// Reads against the committed customer read model.
///
/// Every lookup ignores deleted rows. Listings are ordered by
/// `(created_at, id)`.
#[async_trait]
pub trait CustomerQueries: Send + Sync {
    async fn find_by_id(&self, id: AggregateId) -> Result<Option<CustomerReadModel>>;

    /// `email` must already be normalized.
    async fn find_by_email(&self, email: &str) -> Result<Option<CustomerReadModel>>;

    /// First matching customer when several share the number.
    async fn find_by_phone_number(
        &self,
        phone_number: &str,
    ) -> Result<Option<CustomerReadModel>>;

    async fn find_by_name_and_dob(
        &self,
        first_name: &str,
        last_name: &str,
        date_of_birth: NaiveDate,
    ) -> Result<Option<CustomerReadModel>>;

    async fn list_page(&self, request: PageRequest) -> Result<Page<CustomerReadModel>>;
}
