//! Domain error types.

use event_store::{EventStoreError, Version};
use thiserror::Error;

/// Why an aggregate could not be rebuilt from its history.
///
/// Every variant is fatal for the load: replaying around a bad record would
/// silently produce the wrong state.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// A stored record carries a kind tag with no matching event variant.
    #[error("No apply logic for event kind `{kind}` at version {version}")]
    UnknownKind { version: Version, kind: String },

    /// A stored record could not be decoded.
    #[error("Failed to decode event at version {version}: {source}")]
    Decode {
        version: Version,
        source: EventStoreError,
    },

    /// Records were not contiguous starting at version 1.
    #[error("Event version gap: expected {expected}, found {found}")]
    VersionGap { expected: Version, found: Version },
}
