use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The highest stored version of the entity did not match the version
    /// the writer expected. Nothing from the batch was persisted.
    #[error(
        "Concurrency conflict for entity {entity_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        entity_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The batch handed to `append` was malformed (empty, mixed entities,
    /// or non-contiguous versions).
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// A stored event carries a kind tag the decoder does not know.
    #[error("Unknown event kind `{kind}` at version {version} of entity {entity_id}")]
    UnknownEventKind {
        entity_id: AggregateId,
        version: Version,
        kind: String,
    },

    /// A uniqueness constraint outside the event log rejected the commit.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, EventStoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
