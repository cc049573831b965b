//! In-memory customer read model, committed together with the in-memory log.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{AggregateId, Page, PageRequest};
use event_store::{EventStoreError, InMemoryEventStore, MemoryTables, MemoryTransaction, Version};

use super::{CUSTOMER_PKEY, CustomerQueries, CustomerReadModel, EMAIL_UNIQUE, NAME_DOB_UNIQUE};
use crate::Result;
use crate::read_model::{ReadModelWriter, RowChange};

/// The customer table kept next to the in-memory event log.
///
/// Row changes are staged per transaction and checked at commit against the
/// same constraints the PostgreSQL table declares.
#[derive(Debug, Default)]
pub struct CustomerTable {
    rows: BTreeMap<AggregateId, CustomerReadModel>,
}

impl CustomerTable {
    pub fn get(&self, id: AggregateId) -> Option<&CustomerReadModel> {
        self.rows.get(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Non-deleted rows in listing order.
    fn active(&self) -> Vec<&CustomerReadModel> {
        let mut rows: Vec<_> = self.rows.values().filter(|r| !r.is_deleted).collect();
        rows.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        rows
    }

    fn find_active(
        &self,
        predicate: impl Fn(&CustomerReadModel) -> bool,
    ) -> Option<CustomerReadModel> {
        self.active().into_iter().find(|&r| predicate(r)).cloned()
    }
}

fn violation(constraint: &str) -> EventStoreError {
    EventStoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

impl MemoryTables for CustomerTable {
    type Staged = Vec<RowChange<CustomerReadModel>>;

    fn check(&self, staged: &Self::Staged) -> event_store::Result<()> {
        let mut rows = self.rows.clone();
        for change in staged {
            match change {
                RowChange::Insert(row) => {
                    if rows.contains_key(&row.id) {
                        return Err(violation(CUSTOMER_PKEY));
                    }
                    rows.insert(row.id, row.clone());
                }
                RowChange::Update { row, loaded } => {
                    let actual = rows.get(&row.id).map_or(Version::initial(), |r| r.version);
                    if actual != *loaded {
                        return Err(EventStoreError::ConcurrencyConflict {
                            entity_id: row.id,
                            expected: *loaded,
                            actual,
                        });
                    }
                    rows.insert(row.id, row.clone());
                }
            }
        }

        for changed in staged.iter().map(RowChange::row).filter(|r| !r.is_deleted) {
            let others = rows
                .values()
                .filter(|other| !other.is_deleted && other.id != changed.id);
            for other in others {
                if other.email == changed.email {
                    return Err(violation(EMAIL_UNIQUE));
                }
                if other.has_name_and_dob(
                    &changed.first_name,
                    &changed.last_name,
                    changed.date_of_birth,
                ) {
                    return Err(violation(NAME_DOB_UNIQUE));
                }
            }
        }

        Ok(())
    }

    fn apply(&mut self, staged: Self::Staged) {
        for change in staged {
            let row = change.into_row();
            self.rows.insert(row.id, row);
        }
    }
}

/// Customer read model stored next to an [`InMemoryEventStore`].
///
/// Writes go through the store's transactions; queries see committed rows.
#[derive(Clone, Default)]
pub struct InMemoryCustomerReadModel {
    store: InMemoryEventStore<CustomerTable>,
}

impl InMemoryCustomerReadModel {
    pub fn new(store: InMemoryEventStore<CustomerTable>) -> Self {
        Self { store }
    }

    /// The event store whose transactions carry this read model's writes.
    pub fn store(&self) -> &InMemoryEventStore<CustomerTable> {
        &self.store
    }

    /// Committed row for `id`, deleted or not.
    pub async fn row(&self, id: AggregateId) -> Option<CustomerReadModel> {
        self.store.read_tables(|table| table.get(id).cloned()).await
    }
}

#[async_trait]
impl ReadModelWriter<CustomerReadModel> for InMemoryCustomerReadModel {
    type Tx = MemoryTransaction<CustomerTable>;

    async fn load_for_update(
        &self,
        tx: &mut Self::Tx,
        id: AggregateId,
    ) -> Result<Option<CustomerReadModel>> {
        let staged = tx
            .staged()
            .iter()
            .rev()
            .map(RowChange::row)
            .find(|row| row.id == id)
            .cloned();
        if staged.is_some() {
            return Ok(staged);
        }
        Ok(tx.read_tables(|table| table.get(id).cloned()).await)
    }

    async fn flush(
        &self,
        tx: &mut Self::Tx,
        changes: Vec<RowChange<CustomerReadModel>>,
    ) -> Result<()> {
        tx.staged_mut().extend(changes);
        Ok(())
    }

    async fn row_version(&self, id: AggregateId) -> Result<Option<Version>> {
        Ok(self.row(id).await.map(|row| row.version))
    }
}

#[async_trait]
impl CustomerQueries for InMemoryCustomerReadModel {
    async fn find_by_id(&self, id: AggregateId) -> Result<Option<CustomerReadModel>> {
        Ok(self
            .store
            .read_tables(|table| table.get(id).filter(|r| !r.is_deleted).cloned())
            .await)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<CustomerReadModel>> {
        Ok(self
            .store
            .read_tables(|table| table.find_active(|r| r.email == email))
            .await)
    }

    async fn find_by_phone_number(
        &self,
        phone_number: &str,
    ) -> Result<Option<CustomerReadModel>> {
        Ok(self
            .store
            .read_tables(|table| table.find_active(|r| r.phone_number == phone_number))
            .await)
    }

    async fn find_by_name_and_dob(
        &self,
        first_name: &str,
        last_name: &str,
        date_of_birth: NaiveDate,
    ) -> Result<Option<CustomerReadModel>> {
        Ok(self
            .store
            .read_tables(|table| {
                table.find_active(|r| r.has_name_and_dob(first_name, last_name, date_of_birth))
            })
            .await)
    }

    async fn list_page(&self, request: PageRequest) -> Result<Page<CustomerReadModel>> {
        Ok(self
            .store
            .read_tables(|table| {
                let active = table.active();
                let total = active.len() as u64;
                let items = active
                    .into_iter()
                    .skip(usize::try_from(request.offset()).unwrap_or(usize::MAX))
                    .take(request.page_size() as usize)
                    .cloned()
                    .collect();
                Page::new(items, total, request)
            })
            .await)
    }
}
