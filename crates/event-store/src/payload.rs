//! Codec between typed event variants and stored JSON payloads.

use thiserror::Error;

/// Why a stored payload could not be turned back into an event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown event kind `{0}`")]
    UnknownKind(String),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A closed set of event variants that can be stored in the log.
///
/// Implementations dispatch on the kind tag with an exhaustive `match`;
/// adding a variant means adding an arm to both `kind` and `decode`. New
/// kinds can be added without affecting the decoding of existing ones.
pub trait EventPayload: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// The kind tag stored next to the payload.
    fn kind(&self) -> &'static str;

    /// Serializes the variant's own fields.
    fn encode(&self) -> serde_json::Result<serde_json::Value>;

    /// Rebuilds the variant identified by `kind` from its fields.
    fn decode(kind: &str, payload: serde_json::Value) -> Result<Self, DecodeError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    /// Single-variant event used by the store's own tests.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Ping {
        pub count: u32,
    }

    impl EventPayload for Ping {
        fn kind(&self) -> &'static str {
            "Ping"
        }

        fn encode(&self) -> serde_json::Result<serde_json::Value> {
            serde_json::to_value(self)
        }

        fn decode(kind: &str, payload: serde_json::Value) -> Result<Self, DecodeError> {
            match kind {
                "Ping" => Ok(serde_json::from_value(payload)?),
                other => Err(DecodeError::UnknownKind(other.to_string())),
            }
        }
    }

    #[test]
    fn malformed_payload_is_reported() {
        let err = Ping::decode("Ping", serde_json::json!({ "count": "many" })).unwrap_err();
        assert!(matches!(err, DecodeError::Payload(_)));
    }
}
