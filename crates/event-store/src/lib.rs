pub mod error;
pub mod event;
pub mod memory;
pub mod payload;
pub mod postgres;
pub mod store;
pub mod transaction;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventId, Recorded, Version};
pub use memory::{InMemoryEventStore, MemoryTables, MemoryTransaction};
pub use payload::{DecodeError, EventPayload};
pub use postgres::{PgTransaction, PostgresEventStore};
pub use store::{EventStore, EventStoreExt};
pub use transaction::{Coordinator, Transaction, TransactionManager};
