//! Domain layer for the customer event-sourcing core.
//!
//! This crate provides:
//! - Aggregate trait and `Tracked` wrapper for replay and command bookkeeping
//! - Customer aggregate with its closed set of events and validation rules
//! - Clock abstraction for date-dependent rules

pub mod aggregate;
pub mod clock;
pub mod customer;
pub mod error;

pub use aggregate::{Aggregate, Tracked};
pub use clock::{Clock, FixedClock, SystemClock};
pub use customer::{
    CUSTOMER_CREATED, CUSTOMER_DELETED, CUSTOMER_UPDATED, CreateCustomer, Customer,
    CustomerCreatedData, CustomerDeletedData, CustomerDetails, CustomerError, CustomerEvent,
    CustomerInput, CustomerUpdatedData, DeleteCustomer, Email, FieldError, PhoneNumber,
    UpdateCustomer, ValidationErrors,
};
pub use error::ReplayError;
