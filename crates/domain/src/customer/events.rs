//! Customer domain events.

use chrono::NaiveDate;
use common::AggregateId;
use event_store::{DecodeError, EventPayload};
use serde::{Deserialize, Serialize};

use super::{CustomerDetails, Email, PhoneNumber};

pub const CUSTOMER_CREATED: &str = "CustomerCreated";
pub const CUSTOMER_UPDATED: &str = "CustomerUpdated";
pub const CUSTOMER_DELETED: &str = "CustomerDeleted";

/// Events that can occur on a customer aggregate.
///
/// The kind tag is stored next to the payload and the payload holds only
/// the variant's own fields, so adding a variant never changes how existing
/// records decode.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomerEvent {
    /// Customer was created.
    Created(CustomerCreatedData),

    /// Customer details were replaced.
    Updated(CustomerUpdatedData),

    /// Customer was soft-deleted.
    Deleted(CustomerDeletedData),
}

impl CustomerEvent {
    pub fn created(customer_id: AggregateId, details: &CustomerDetails) -> Self {
        CustomerEvent::Created(CustomerCreatedData {
            customer_id,
            first_name: details.first_name.clone(),
            last_name: details.last_name.clone(),
            date_of_birth: details.date_of_birth,
            phone_number: details.phone_number.clone(),
            email: details.email.clone(),
            bank_account_number: details.bank_account_number.clone(),
        })
    }

    pub fn updated(customer_id: AggregateId, details: &CustomerDetails) -> Self {
        CustomerEvent::Updated(CustomerUpdatedData {
            customer_id,
            first_name: details.first_name.clone(),
            last_name: details.last_name.clone(),
            date_of_birth: details.date_of_birth,
            phone_number: details.phone_number.clone(),
            email: details.email.clone(),
            bank_account_number: details.bank_account_number.clone(),
        })
    }

    pub fn deleted(customer_id: AggregateId) -> Self {
        CustomerEvent::Deleted(CustomerDeletedData { customer_id })
    }
}

impl EventPayload for CustomerEvent {
    fn kind(&self) -> &'static str {
        match self {
            CustomerEvent::Created(_) => CUSTOMER_CREATED,
            CustomerEvent::Updated(_) => CUSTOMER_UPDATED,
            CustomerEvent::Deleted(_) => CUSTOMER_DELETED,
        }
    }

    fn encode(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            CustomerEvent::Created(data) => serde_json::to_value(data),
            CustomerEvent::Updated(data) => serde_json::to_value(data),
            CustomerEvent::Deleted(data) => serde_json::to_value(data),
        }
    }

    fn decode(kind: &str, payload: serde_json::Value) -> Result<Self, DecodeError> {
        match kind {
            CUSTOMER_CREATED => Ok(CustomerEvent::Created(serde_json::from_value(payload)?)),
            CUSTOMER_UPDATED => Ok(CustomerEvent::Updated(serde_json::from_value(payload)?)),
            CUSTOMER_DELETED => Ok(CustomerEvent::Deleted(serde_json::from_value(payload)?)),
            other => Err(DecodeError::UnknownKind(other.to_string())),
        }
    }
}

/// Data for CustomerCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerCreatedData {
    pub customer_id: AggregateId,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub phone_number: PhoneNumber,
    pub email: Email,
    pub bank_account_number: String,
}

/// Data for CustomerUpdated event. Carries the full replacement details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerUpdatedData {
    pub customer_id: AggregateId,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub phone_number: PhoneNumber,
    pub email: Email,
    pub bank_account_number: String,
}

/// Data for CustomerDeleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDeletedData {
    pub customer_id: AggregateId,
}

impl From<&CustomerCreatedData> for CustomerDetails {
    fn from(data: &CustomerCreatedData) -> Self {
        CustomerDetails {
            first_name: data.first_name.clone(),
            last_name: data.last_name.clone(),
            date_of_birth: data.date_of_birth,
            phone_number: data.phone_number.clone(),
            email: data.email.clone(),
            bank_account_number: data.bank_account_number.clone(),
        }
    }
}

impl From<&CustomerUpdatedData> for CustomerDetails {
    fn from(data: &CustomerUpdatedData) -> Self {
        CustomerDetails {
            first_name: data.first_name.clone(),
            last_name: data.last_name.clone(),
            date_of_birth: data.date_of_birth,
            phone_number: data.phone_number.clone(),
            email: data.email.clone(),
            bank_account_number: data.bank_account_number.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> CustomerDetails {
        CustomerDetails {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 12, 10).unwrap(),
            phone_number: PhoneNumber::parse("+447911123456").unwrap(),
            email: Email::parse("ada@example.com").unwrap(),
            bank_account_number: "12345678".to_string(),
        }
    }

    #[test]
    fn payload_uses_field_names_verbatim() {
        let id = AggregateId::new();
        let payload = CustomerEvent::created(id, &details()).encode().unwrap();

        assert_eq!(
            payload,
            serde_json::json!({
                "customer_id": id.to_string(),
                "first_name": "Ada",
                "last_name": "Lovelace",
                "date_of_birth": "1990-12-10",
                "phone_number": "+447911123456",
                "email": "ada@example.com",
                "bank_account_number": "12345678",
            })
        );
    }

    #[test]
    fn decode_dispatches_on_kind() {
        let id = AggregateId::new();
        let event = CustomerEvent::updated(id, &details());
        let decoded = CustomerEvent::decode(event.kind(), event.encode().unwrap()).unwrap();
        assert_eq!(decoded, event);

        let deleted = CustomerEvent::decode(
            CUSTOMER_DELETED,
            serde_json::json!({ "customer_id": id.to_string() }),
        )
        .unwrap();
        assert_eq!(deleted, CustomerEvent::deleted(id));
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let err = CustomerEvent::decode("CustomerArchived", serde_json::json!({})).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownKind(kind) if kind == "CustomerArchived"));
    }

    #[test]
    fn decode_rejects_missing_fields() {
        let err = CustomerEvent::decode(CUSTOMER_CREATED, serde_json::json!({})).unwrap_err();
        assert!(matches!(err, DecodeError::Payload(_)));
    }
}
