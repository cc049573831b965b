//! Customer aggregate implementation.

use chrono::NaiveDate;
use common::AggregateId;

use crate::aggregate::Aggregate;

use super::{CustomerError, CustomerEvent, CustomerInput, Email, PhoneNumber};

/// Validated customer fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerDetails {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub phone_number: PhoneNumber,
    pub email: Email,
    pub bank_account_number: String,
}

/// Customer aggregate root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Customer {
    id: Option<AggregateId>,
    details: Option<CustomerDetails>,
    is_deleted: bool,
}

impl Aggregate for Customer {
    type Event = CustomerEvent;
    type Error = CustomerError;

    fn aggregate_type() -> &'static str {
        "Customer"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn apply(&mut self, event: &CustomerEvent) {
        match event {
            CustomerEvent::Created(data) => {
                self.id = Some(data.customer_id);
                self.details = Some(data.into());
                self.is_deleted = false;
            }
            CustomerEvent::Updated(data) => {
                self.details = Some(data.into());
            }
            CustomerEvent::Deleted(_) => {
                self.is_deleted = true;
            }
        }
    }
}

// Query methods
impl Customer {
    pub fn details(&self) -> Option<&CustomerDetails> {
        self.details.as_ref()
    }
}

// Command methods (return events)
impl Customer {
    /// Creates a new customer.
    pub fn create(
        &self,
        customer_id: AggregateId,
        input: &CustomerInput,
        today: NaiveDate,
    ) -> Result<Vec<CustomerEvent>, CustomerError> {
        if let Some(id) = self.id {
            return Err(CustomerError::AlreadyExists { id });
        }

        let details = input.validate(today)?;
        Ok(vec![CustomerEvent::created(customer_id, &details)])
    }

    /// Replaces every detail of an existing customer.
    pub fn update(
        &self,
        input: &CustomerInput,
        today: NaiveDate,
    ) -> Result<Vec<CustomerEvent>, CustomerError> {
        let id = self.ensure_live()?;
        let details = input.validate(today)?;
        Ok(vec![CustomerEvent::updated(id, &details)])
    }

    /// Soft-deletes the customer.
    pub fn delete(&self) -> Result<Vec<CustomerEvent>, CustomerError> {
        let id = self.ensure_live()?;
        Ok(vec![CustomerEvent::deleted(id)])
    }

    fn ensure_live(&self) -> Result<AggregateId, CustomerError> {
        match self.id {
            None => Err(CustomerError::NotCreated),
            Some(id) if self.is_deleted => Err(CustomerError::Deleted { id }),
            Some(id) => Ok(id),
        }
    }
}
