use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, EventPayload, EventStoreError, Result, payload::DecodeError};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an event within its entity's stream.
///
/// The first event of a stream is version 1; an entity with no events is at
/// version 0. Stored versions for one entity are always `1..=N` with no gaps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for a new entity.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1) for the first event.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the version `count` events before this one, floored at 0.
    pub fn rewind(&self, count: usize) -> Self {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(count).max(0))
    }

    pub fn is_initial(&self) -> bool {
        self.0 == 0
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A typed event together with its position in the stream.
///
/// This is the in-memory form of an event: it is produced by entity commands
/// and by decoding stored records, and it is what replay and projection
/// consume.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded<E> {
    pub id: EventId,
    pub occurred_on: DateTime<Utc>,
    pub version: Version,
    pub event: E,
}

impl<E: EventPayload> Recorded<E> {
    /// Stamps a freshly produced event with a new id, the current time and
    /// its stream version.
    pub fn new(event: E, version: Version) -> Self {
        Self {
            id: EventId::new(),
            occurred_on: Utc::now(),
            version,
            event,
        }
    }

    /// The kind tag of the wrapped event.
    pub fn kind(&self) -> &'static str {
        self.event.kind()
    }
}

/// A persisted event record.
///
/// `(entity_id, version)` is unique across the whole log; that constraint is
/// what turns concurrent appends into concurrency conflicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,

    /// The entity this event belongs to.
    pub entity_id: AggregateId,

    /// The type of entity (e.g. "Customer").
    pub entity_type: String,

    /// Kind tag used to decode the payload back into its variant.
    pub kind: String,

    /// The variant's fields as JSON, keyed by their field names.
    pub payload: serde_json::Value,

    /// The version of the entity after this event.
    pub version: Version,

    pub occurred_on: DateTime<Utc>,
}

impl EventEnvelope {
    /// Serializes a typed event into a storable record.
    pub fn encode<E: EventPayload>(
        entity_id: AggregateId,
        entity_type: &str,
        record: &Recorded<E>,
    ) -> Result<Self> {
        Ok(Self {
            id: record.id,
            entity_id,
            entity_type: entity_type.to_string(),
            kind: record.kind().to_string(),
            payload: record.event.encode()?,
            version: record.version,
            occurred_on: record.occurred_on,
        })
    }

    /// Deserializes the record back into its concrete event variant.
    ///
    /// An unknown kind tag is an error: skipping it would silently change the
    /// state produced by replay.
    pub fn decode<E: EventPayload>(self) -> Result<Recorded<E>> {
        let event = E::decode(&self.kind, self.payload).map_err(|e| match e {
            DecodeError::UnknownKind(kind) => EventStoreError::UnknownEventKind {
                entity_id: self.entity_id,
                version: self.version,
                kind,
            },
            DecodeError::Payload(err) => EventStoreError::Serialization(err),
        })?;

        Ok(Recorded {
            id: self.id,
            occurred_on: self.occurred_on,
            version: self.version,
            event,
        })
    }
}
