//! Projection error types.

use common::AggregateId;
use thiserror::Error;

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// A handler tried to insert a row for an id that already has one.
    #[error("Read model row already exists for {id}")]
    RowAlreadyExists { id: AggregateId },

    /// The read-model table rejected a row because a business key is taken.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A read-model database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A handler failed for a reason of its own.
    #[error("Handler `{handler}` failed on {kind}: {message}")]
    Handler {
        handler: &'static str,
        kind: &'static str,
        message: String,
    },
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
