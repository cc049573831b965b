//! Repository error types.

use common::{AggregateId, PagingError};
use domain::{CustomerError, ReplayError, ValidationErrors};
use event_store::{EventStoreError, Version};
use projections::ProjectionError;
use projections::customers::{EMAIL_UNIQUE, NAME_DOB_UNIQUE};
use thiserror::Error;

/// Errors reported by [`CustomerRepository`](crate::CustomerRepository).
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The customer has no events, or has been deleted.
    #[error("Customer {id} not found")]
    NotFound { id: AggregateId },

    /// Input failed validation; nothing was stored.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Another active customer already holds this business key.
    #[error("{field} is already used by another customer")]
    Uniqueness { field: &'static str },

    /// The customer changed since the caller last saw it.
    #[error("Concurrency conflict for customer {id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The customer's state does not allow the command.
    #[error("Command rejected: {0}")]
    Rejected(CustomerError),

    /// The customer's history could not be replayed.
    #[error("Failed to rebuild customer: {0}")]
    Reconstruction(#[from] ReplayError),

    #[error("Projection error: {0}")]
    Projection(ProjectionError),

    #[error("Event store error: {0}")]
    Store(EventStoreError),

    #[error("Invalid paging: {0}")]
    Paging(#[from] PagingError),
}

impl RepositoryError {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, RepositoryError::ConcurrencyConflict { .. })
    }

    /// Maps a violated read-model constraint to the business key it guards.
    fn from_constraint(constraint: &str) -> Option<Self> {
        let field = match constraint {
            EMAIL_UNIQUE => "email",
            NAME_DOB_UNIQUE => "name_and_date_of_birth",
            _ => return None,
        };
        Some(RepositoryError::Uniqueness { field })
    }
}

impl From<CustomerError> for RepositoryError {
    fn from(err: CustomerError) -> Self {
        match err {
            CustomerError::Validation(errors) => RepositoryError::Validation(errors),
            CustomerError::Deleted { id } => RepositoryError::NotFound { id },
            other => RepositoryError::Rejected(other),
        }
    }
}

impl From<ValidationErrors> for RepositoryError {
    fn from(errors: ValidationErrors) -> Self {
        RepositoryError::Validation(errors)
    }
}

impl From<EventStoreError> for RepositoryError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict {
                entity_id,
                expected,
                actual,
            } => RepositoryError::ConcurrencyConflict {
                id: entity_id,
                expected,
                actual,
            },
            EventStoreError::UniqueViolation { constraint } => {
                Self::from_constraint(&constraint).unwrap_or(RepositoryError::Store(
                    EventStoreError::UniqueViolation { constraint },
                ))
            }
            other => RepositoryError::Store(other),
        }
    }
}

impl From<ProjectionError> for RepositoryError {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::EventStore(inner) => inner.into(),
            ProjectionError::UniqueViolation { constraint } => Self::from_constraint(&constraint)
                .unwrap_or(RepositoryError::Projection(ProjectionError::UniqueViolation {
                    constraint,
                })),
            other => RepositoryError::Projection(other),
        }
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
