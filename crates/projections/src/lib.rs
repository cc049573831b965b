//! Read models and projections for the CQRS query side.
//!
//! This crate provides the query side of the CQRS pattern:
//! - [`ProjectionRegistry`] mapping each event kind to its ordered handlers
//! - [`ProjectionProcessor`] projecting events inside the appending transaction,
//!   plus catch-up for read models that fell behind the log
//! - [`ReadModelWriter`] for persisting rows in that same transaction
//! - The customer read model with in-memory and PostgreSQL backends

pub mod customers;
pub mod error;
pub mod processor;
pub mod read_model;
pub mod registry;

pub use customers::{
    CustomerProcessor, CustomerQueries, CustomerReadModel, CustomerTable,
    InMemoryCustomerReadModel, PostgresCustomerReadModel, customer_registry,
};
pub use error::{ProjectionError, Result};
pub use processor::{CatchUpReport, ProjectionProcessor};
pub use read_model::{ReadModelRow, ReadModelWriter, RowChange, RowSet};
pub use registry::{Handler, ProjectedEvent, ProjectionRegistry};
