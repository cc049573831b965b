//! Customer management over an event-sourced core.
//!
//! This crate provides:
//! - [`CustomerRepository`] combining event replay for loads with read-model
//!   lookups, and running every command as one append-plus-projection
//!   transaction
//! - Environment configuration and tracing setup for the maintenance binary

pub mod config;
pub mod error;
pub mod repository;
pub mod telemetry;

pub use config::{Config, LogFormat};
pub use error::{RepositoryError, Result};
pub use repository::CustomerRepository;
