//! Customer aggregate and related types.

mod aggregate;
mod commands;
mod error;
mod events;
pub mod value_objects;

pub use aggregate::{Customer, CustomerDetails};
pub use commands::{CreateCustomer, CustomerInput, DeleteCustomer, UpdateCustomer};
pub use error::{CustomerError, FieldError, ValidationErrors};
pub use events::{
    CUSTOMER_CREATED, CUSTOMER_DELETED, CUSTOMER_UPDATED, CustomerCreatedData,
    CustomerDeletedData, CustomerEvent, CustomerUpdatedData,
};
pub use value_objects::{Email, PhoneNumber};
