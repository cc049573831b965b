use async_trait::async_trait;

use crate::{
    AggregateId, EventEnvelope, EventPayload, EventStoreError, Recorded, Result, Version,
    transaction::TransactionManager,
};

/// Core trait for event store implementations.
///
/// The store is the sole source of truth: an append-only log of event
/// records keyed by `(entity_id, version)`. Appends always run inside a
/// transaction obtained from the same store so that other work (such as
/// read-model projection) commits or rolls back together with them.
#[async_trait]
pub trait EventStore: TransactionManager {
    /// Appends events for one entity.
    ///
    /// Fails with `ConcurrencyConflict` unless the highest stored version of
    /// `entity_id` equals `expected_version`. Either every event of the batch
    /// lands when the transaction commits or none does.
    ///
    /// Returns the entity's version after the batch.
    async fn append(
        &self,
        tx: &mut Self::Tx,
        entity_id: AggregateId,
        entity_type: &str,
        events: Vec<EventEnvelope>,
        expected_version: Version,
    ) -> Result<Version>;

    /// Retrieves the events of an entity with a version greater than
    /// `after`, oldest first.
    async fn load_from(&self, entity_id: AggregateId, after: Version)
    -> Result<Vec<EventEnvelope>>;

    /// Retrieves every event of an entity, oldest first.
    async fn load_all(&self, entity_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        self.load_from(entity_id, Version::initial()).await
    }

    /// Ids of every entity of `entity_type` that has at least one event.
    async fn list_entity_ids(&self, entity_type: &str) -> Result<Vec<AggregateId>>;

    /// Gets the current version of an entity, or None if it has no events.
    async fn entity_version(&self, entity_id: AggregateId) -> Result<Option<Version>>;
}

/// Typed helpers over [`EventStore`].
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Encodes and appends typed events.
    async fn append_records<E: EventPayload>(
        &self,
        tx: &mut Self::Tx,
        entity_id: AggregateId,
        entity_type: &str,
        records: &[Recorded<E>],
        expected_version: Version,
    ) -> Result<Version> {
        let envelopes = records
            .iter()
            .map(|record| EventEnvelope::encode(entity_id, entity_type, record))
            .collect::<Result<Vec<_>>>()?;
        self.append(tx, entity_id, entity_type, envelopes, expected_version)
            .await
    }

    /// Loads and decodes every event of an entity.
    async fn load_records<E: EventPayload>(
        &self,
        entity_id: AggregateId,
    ) -> Result<Vec<Recorded<E>>> {
        self.load_records_from(entity_id, Version::initial()).await
    }

    /// Loads and decodes the events after `after`.
    async fn load_records_from<E: EventPayload>(
        &self,
        entity_id: AggregateId,
        after: Version,
    ) -> Result<Vec<Recorded<E>>> {
        self.load_from(entity_id, after)
            .await?
            .into_iter()
            .map(EventEnvelope::decode)
            .collect()
    }

    /// Checks if an entity exists (has any events).
    async fn entity_exists(&self, entity_id: AggregateId) -> Result<bool> {
        Ok(self.entity_version(entity_id).await?.is_some())
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Validates a batch before it is appended.
///
/// The batch must be non-empty, belong to `entity_id`/`entity_type`, and
/// carry the versions directly following `expected_version`.
pub fn validate_append(
    entity_id: AggregateId,
    entity_type: &str,
    events: &[EventEnvelope],
    expected_version: Version,
) -> Result<Version> {
    if events.is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty event list".to_string(),
        ));
    }

    let mut version = expected_version;
    for event in events {
        if event.entity_id != entity_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "event {} belongs to entity {}, not {}",
                event.id, event.entity_id, entity_id
            )));
        }
        if event.entity_type != entity_type {
            return Err(EventStoreError::InvalidAppend(format!(
                "event {} has entity type {}, not {}",
                event.id, event.entity_type, entity_type
            )));
        }
        version = version.next();
        if event.version != version {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be sequential: expected {}, got {}",
                version, event.version
            )));
        }
    }

    Ok(version)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::EventId;

    fn envelope(entity_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope {
            id: EventId::new(),
            entity_id,
            entity_type: "Customer".to_string(),
            kind: "CustomerUpdated".to_string(),
            payload: serde_json::json!({}),
            version: Version::new(version),
            occurred_on: Utc::now(),
        }
    }

    #[test]
    fn accepts_contiguous_batch() {
        let id = AggregateId::new();
        let events = vec![envelope(id, 3), envelope(id, 4)];
        let last = validate_append(id, "Customer", &events, Version::new(2)).unwrap();
        assert_eq!(last, Version::new(4));
    }

    #[test]
    fn rejects_empty_batch() {
        let result = validate_append(AggregateId::new(), "Customer", &[], Version::initial());
        assert!(matches!(result, Err(EventStoreError::InvalidAppend(_))));
    }

    #[test]
    fn rejects_gap_after_expected_version() {
        let id = AggregateId::new();
        let events = vec![envelope(id, 3)];
        let result = validate_append(id, "Customer", &events, Version::first());
        assert!(matches!(result, Err(EventStoreError::InvalidAppend(_))));
    }

    #[test]
    fn rejects_foreign_entity() {
        let id = AggregateId::new();
        let events = vec![envelope(id, 1), envelope(AggregateId::new(), 2)];
        let result = validate_append(id, "Customer", &events, Version::initial());
        assert!(matches!(result, Err(EventStoreError::InvalidAppend(_))));
    }

    #[test]
    fn rejects_mismatched_entity_type() {
        let id = AggregateId::new();
        let events = vec![envelope(id, 1)];
        let result = validate_append(id, "Account", &events, Version::initial());
        assert!(matches!(result, Err(EventStoreError::InvalidAppend(_))));
    }
}
