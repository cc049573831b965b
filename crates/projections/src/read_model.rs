//! Read-model rows and the writer that persists them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use common::AggregateId;
use event_store::Version;

use crate::{ProjectionError, Result};

/// One row of a read-model table, keyed by the id of its entity.
pub trait ReadModelRow: Clone + Send + Sync + 'static {
    fn id(&self) -> AggregateId;

    /// Version of the last event projected into this row.
    fn version(&self) -> Version;
}

/// A pending write produced by projection.
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange<R> {
    Insert(R),
    /// Overwrites a row that was at version `loaded` when it was read.
    /// Writers must refuse the change if the stored row has moved on.
    Update { row: R, loaded: Version },
}

impl<R: ReadModelRow> RowChange<R> {
    pub fn row(&self) -> &R {
        match self {
            RowChange::Insert(row) | RowChange::Update { row, .. } => row,
        }
    }

    pub fn into_row(self) -> R {
        match self {
            RowChange::Insert(row) | RowChange::Update { row, .. } => row,
        }
    }
}

/// Persists read-model rows inside the transaction that appends events.
#[async_trait]
pub trait ReadModelWriter<R: ReadModelRow>: Send + Sync {
    type Tx: Send;

    /// Loads the row for `id` as seen by `tx`, including writes already
    /// flushed in that transaction.
    async fn load_for_update(&self, tx: &mut Self::Tx, id: AggregateId) -> Result<Option<R>>;

    /// Writes every change inside `tx`.
    async fn flush(&self, tx: &mut Self::Tx, changes: Vec<RowChange<R>>) -> Result<()>;

    /// Committed version of the row for `id`, if any.
    async fn row_version(&self, id: AggregateId) -> Result<Option<Version>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowState {
    /// Loaded at the given version and not modified yet.
    Clean(Version),
    Inserted,
    Updated(Version),
}

/// Rows visible to handlers during one projection batch.
///
/// Handlers mutate rows here; nothing reaches the writer until the whole
/// batch has been handled.
#[derive(Debug, Clone)]
pub struct RowSet<R> {
    rows: BTreeMap<AggregateId, (R, RowState)>,
}

impl<R> Default for RowSet<R> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<R: ReadModelRow> RowSet<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a row that already exists in storage.
    pub fn preload(&mut self, row: R) {
        let loaded = row.version();
        self.rows.insert(row.id(), (row, RowState::Clean(loaded)));
    }

    pub fn get(&self, id: AggregateId) -> Option<&R> {
        self.rows.get(&id).map(|(row, _)| row)
    }

    /// Borrows a row for modification and marks it changed.
    pub fn get_mut(&mut self, id: AggregateId) -> Option<&mut R> {
        self.rows.get_mut(&id).map(|(row, state)| {
            if let RowState::Clean(loaded) = *state {
                *state = RowState::Updated(loaded);
            }
            row
        })
    }

    /// Adds a new row. Fails if a row with the same id is already present.
    pub fn insert(&mut self, row: R) -> Result<()> {
        let id = row.id();
        if self.rows.contains_key(&id) {
            return Err(ProjectionError::RowAlreadyExists { id });
        }
        self.rows.insert(id, (row, RowState::Inserted));
        Ok(())
    }

    pub fn has_changes(&self) -> bool {
        self.rows
            .values()
            .any(|(_, state)| !matches!(state, RowState::Clean(_)))
    }

    /// The writes needed to persist every changed row.
    pub fn into_changes(self) -> Vec<RowChange<R>> {
        self.rows
            .into_values()
            .filter_map(|(row, state)| match state {
                RowState::Clean(_) => None,
                RowState::Inserted => Some(RowChange::Insert(row)),
                RowState::Updated(loaded) => Some(RowChange::Update { row, loaded }),
            })
            .collect()
    }
}
