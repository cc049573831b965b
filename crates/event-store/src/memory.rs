use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Version,
    store::{EventStore, validate_append},
    transaction::{Transaction, TransactionManager},
};

/// Extra tables kept next to the in-memory log and committed with it.
///
/// Writes made through a [`MemoryTransaction`] are staged in `Staged` and
/// only applied when the transaction commits, under the same lock as the
/// staged events. `check` runs first and can veto the whole commit, which is
/// how uniqueness constraints on read-model tables are enforced.
pub trait MemoryTables: Default + Send + Sync + 'static {
    type Staged: Default + Send + Sync + 'static;

    /// Verifies that applying `staged` would keep the tables consistent.
    fn check(&self, staged: &Self::Staged) -> Result<()>;

    fn apply(&mut self, staged: Self::Staged);
}

impl MemoryTables for () {
    type Staged = ();

    fn check(&self, _staged: &()) -> Result<()> {
        Ok(())
    }

    fn apply(&mut self, _staged: ()) {}
}

#[derive(Default)]
struct MemoryState<T> {
    events: Vec<EventEnvelope>,
    versions: HashMap<AggregateId, Version>,
    tables: T,
}

impl<T> MemoryState<T> {
    fn version_of(&self, entity_id: AggregateId) -> Version {
        self.versions
            .get(&entity_id)
            .copied()
            .unwrap_or(Version::initial())
    }
}

/// In-memory event store implementation for testing.
///
/// This implementation stores all events in memory and provides
/// the same interface as the PostgreSQL implementation, including
/// transactions: appends are staged and become visible only on commit.
pub struct InMemoryEventStore<T: MemoryTables = ()> {
    state: Arc<RwLock<MemoryState<T>>>,
}

impl<T: MemoryTables> Clone for InMemoryEventStore<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: MemoryTables> Default for InMemoryEventStore<T> {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
        }
    }
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store without extra tables.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: MemoryTables> InMemoryEventStore<T> {
    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Reads the committed tables.
    pub async fn read_tables<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.state.read().await.tables)
    }
}

struct StagedAppend {
    entity_id: AggregateId,
    expected: Version,
    events: Vec<EventEnvelope>,
}

/// Transaction over an [`InMemoryEventStore`].
///
/// Concurrency is optimistic: two transactions may stage appends for the
/// same entity, and the one that commits second fails with a concurrency
/// conflict. Dropping the transaction discards everything staged.
pub struct MemoryTransaction<T: MemoryTables> {
    state: Arc<RwLock<MemoryState<T>>>,
    appends: Vec<StagedAppend>,
    staged: T::Staged,
}

impl<T: MemoryTables> MemoryTransaction<T> {
    /// Table writes staged so far.
    pub fn staged(&self) -> &T::Staged {
        &self.staged
    }

    pub fn staged_mut(&mut self) -> &mut T::Staged {
        &mut self.staged
    }

    /// Reads the committed tables (staged writes are not included).
    pub async fn read_tables<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.state.read().await.tables)
    }

    /// The version an entity will have once the appends staged for it in
    /// this transaction are committed.
    fn staged_version(&self, entity_id: AggregateId) -> Option<Version> {
        self.appends
            .iter()
            .rev()
            .find(|append| append.entity_id == entity_id)
            .and_then(|append| append.events.last())
            .map(|event| event.version)
    }
}

#[async_trait]
impl<T: MemoryTables> Transaction for MemoryTransaction<T> {
    async fn commit(self) -> Result<()> {
        let Self {
            state,
            appends,
            staged,
        } = self;
        let mut state = state.write().await;

        // Re-check every staged append against what was committed meanwhile.
        let mut running: HashMap<AggregateId, Version> = HashMap::new();
        for append in &appends {
            let actual = running
                .get(&append.entity_id)
                .copied()
                .unwrap_or_else(|| state.version_of(append.entity_id));
            if actual != append.expected {
                metrics::counter!("event_store_concurrency_conflicts").increment(1);
                return Err(EventStoreError::ConcurrencyConflict {
                    entity_id: append.entity_id,
                    expected: append.expected,
                    actual,
                });
            }
            if let Some(last) = append.events.last() {
                running.insert(append.entity_id, last.version);
            }
        }

        state.tables.check(&staged)?;

        for append in appends {
            state.events.extend(append.events);
        }
        state.versions.extend(running);
        state.tables.apply(staged);

        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: MemoryTables> TransactionManager for InMemoryEventStore<T> {
    type Tx = MemoryTransaction<T>;

    async fn begin(&self) -> Result<MemoryTransaction<T>> {
        Ok(MemoryTransaction {
            state: Arc::clone(&self.state),
            appends: Vec::new(),
            staged: T::Staged::default(),
        })
    }
}

#[async_trait]
impl<T: MemoryTables> EventStore for InMemoryEventStore<T> {
    async fn append(
        &self,
        tx: &mut MemoryTransaction<T>,
        entity_id: AggregateId,
        entity_type: &str,
        events: Vec<EventEnvelope>,
        expected_version: Version,
    ) -> Result<Version> {
        if !Arc::ptr_eq(&self.state, &tx.state) {
            return Err(EventStoreError::InvalidAppend(
                "transaction belongs to a different store".to_string(),
            ));
        }
        let last_version = validate_append(entity_id, entity_type, &events, expected_version)?;

        let current_version = match tx.staged_version(entity_id) {
            Some(version) => version,
            None => self.state.read().await.version_of(entity_id),
        };
        if current_version != expected_version {
            metrics::counter!("event_store_concurrency_conflicts").increment(1);
            return Err(EventStoreError::ConcurrencyConflict {
                entity_id,
                expected: expected_version,
                actual: current_version,
            });
        }

        tx.appends.push(StagedAppend {
            entity_id,
            expected: expected_version,
            events,
        });

        Ok(last_version)
    }

    async fn load_from(
        &self,
        entity_id: AggregateId,
        after: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        let mut events: Vec<_> = state
            .events
            .iter()
            .filter(|e| e.entity_id == entity_id && e.version > after)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn list_entity_ids(&self, entity_type: &str) -> Result<Vec<AggregateId>> {
        let state = self.state.read().await;
        let mut seen = HashSet::new();
        Ok(state
            .events
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .map(|e| e.entity_id)
            .filter(|id| seen.insert(*id))
            .collect())
    }

    async fn entity_version(&self, entity_id: AggregateId) -> Result<Option<Version>> {
        Ok(self.state.read().await.versions.get(&entity_id).copied())
    }
}
