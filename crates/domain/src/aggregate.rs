//! Core aggregate trait and the replay/command bookkeeping around it.

use common::AggregateId;
use event_store::{EventEnvelope, EventPayload, EventStoreError, Recorded, Version};

use crate::error::ReplayError;

/// Trait for aggregates in an event-sourced system.
///
/// An aggregate is plain state plus a pure `apply` function. Versioning and
/// the buffer of not-yet-persisted events live in [`Tracked`], not in the
/// aggregate itself.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The closed set of events this aggregate produces and consumes.
    type Event: EventPayload;

    /// The type of errors this aggregate's commands can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name stored with every event.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    ///
    /// Returns None for a new, uninitialized aggregate.
    fn id(&self) -> Option<AggregateId>;

    /// Whether the aggregate has been soft-deleted.
    fn is_deleted(&self) -> bool {
        false
    }

    /// Applies an event to the aggregate, updating its state.
    ///
    /// This method must be pure and deterministic:
    /// - Given the same state and event, it must always produce the same new state
    /// - It must not have side effects
    /// - It must not fail (events represent facts that have happened)
    fn apply(&mut self, event: &Self::Event);
}

/// An aggregate together with its stream version and pending events.
#[derive(Debug, Clone)]
pub struct Tracked<A: Aggregate> {
    state: A,
    version: Version,
    pending: Vec<Recorded<A::Event>>,
}

impl<A: Aggregate> Default for Tracked<A> {
    fn default() -> Self {
        Self {
            state: A::default(),
            version: Version::initial(),
            pending: Vec::new(),
        }
    }
}

impl<A: Aggregate> Tracked<A> {
    /// Starts a brand-new aggregate at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds an aggregate by replaying its history in version order.
    pub fn from_history(
        records: impl IntoIterator<Item = Recorded<A::Event>>,
    ) -> Result<Self, ReplayError> {
        let mut tracked = Self::new();
        for record in records {
            tracked.apply_for_replay(record)?;
        }
        Ok(tracked)
    }

    /// Decodes stored records and replays them.
    ///
    /// A record whose kind tag has no matching event variant makes the whole
    /// aggregate unloadable.
    pub fn from_envelopes(envelopes: Vec<EventEnvelope>) -> Result<Self, ReplayError> {
        let mut tracked = Self::new();
        for envelope in envelopes {
            let version = envelope.version;
            let record = envelope.decode::<A::Event>().map_err(|e| match e {
                EventStoreError::UnknownEventKind { kind, .. } => {
                    ReplayError::UnknownKind { version, kind }
                }
                other => ReplayError::Decode {
                    version,
                    source: other,
                },
            })?;
            tracked.apply_for_replay(record)?;
        }
        Ok(tracked)
    }

    /// Applies a historical event without recording it as pending.
    pub fn apply_for_replay(&mut self, record: Recorded<A::Event>) -> Result<(), ReplayError> {
        let expected = self.version.next();
        if record.version != expected {
            return Err(ReplayError::VersionGap {
                expected,
                found: record.version,
            });
        }
        self.state.apply(&record.event);
        self.version = record.version;
        Ok(())
    }

    /// Applies a freshly produced event, stamps it with the next version
    /// and buffers it for persistence.
    pub fn apply_for_command(&mut self, event: A::Event) -> &Recorded<A::Event> {
        self.version = self.version.next();
        self.state.apply(&event);
        self.pending.push(Recorded::new(event, self.version));
        &self.pending[self.pending.len() - 1]
    }

    /// Runs a command against the current state and applies the events it
    /// produces. A rejected command changes nothing.
    ///
    /// Returns the number of events produced.
    pub fn execute<F>(&mut self, command: F) -> Result<usize, A::Error>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
    {
        let events = command(&self.state)?;
        let count = events.len();
        for event in events {
            self.apply_for_command(event);
        }
        Ok(count)
    }

    pub fn state(&self) -> &A {
        &self.state
    }

    /// Version of the last applied event, pending ones included.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Events produced by commands and not yet persisted.
    pub fn pending(&self) -> &[Recorded<A::Event>] {
        &self.pending
    }

    /// The stream version before any pending event, i.e. the version the
    /// store must still hold for the pending events to be appended.
    pub fn expected_version(&self) -> Version {
        self.version.rewind(self.pending.len())
    }

    /// Forgets the pending events once they have been persisted.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Takes the pending events out of the buffer.
    pub fn take_pending(&mut self) -> Vec<Recorded<A::Event>> {
        std::mem::take(&mut self.pending)
    }

    /// Whether the aggregate exists and has not been deleted.
    pub fn is_live(&self) -> bool {
        self.state.id().is_some() && !self.state.is_deleted()
    }
}
