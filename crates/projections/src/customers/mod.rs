//! Customer read model: one row per customer, kept in step with its events.

mod handlers;
mod memory;
mod postgres;
mod queries;
mod row;

pub use handlers::{customer_registry, on_created, on_deleted, on_updated};
pub use memory::{CustomerTable, InMemoryCustomerReadModel};
pub use postgres::PostgresCustomerReadModel;
pub use queries::CustomerQueries;
pub use row::CustomerReadModel;

use domain::CustomerEvent;

use crate::ProjectionProcessor;

/// Partial unique index on `email` among rows that are not deleted.
pub const EMAIL_UNIQUE: &str = "ux_customer_read_models_email_active";

/// Partial unique index on `(first_name, last_name, date_of_birth)` among
/// rows that are not deleted.
pub const NAME_DOB_UNIQUE: &str = "ux_customer_read_models_name_dob_active";

/// Primary key of the customer read-model table.
pub const CUSTOMER_PKEY: &str = "customer_read_models_pkey";

/// Processor that projects customer events into `W`.
pub type CustomerProcessor<W> = ProjectionProcessor<CustomerEvent, CustomerReadModel, W>;
