//! Customer commands and their input.

use chrono::NaiveDate;
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use super::{
    CustomerDetails, Email, PhoneNumber, ValidationErrors,
    value_objects::{check_date_of_birth, parse_bank_account_number, parse_name},
};

/// Raw customer fields as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInput {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub phone_number: String,
    pub email: String,
    pub bank_account_number: String,
}

impl CustomerInput {
    /// Validates every field and returns the normalized details.
    ///
    /// All failing fields are reported, not just the first one.
    pub fn validate(&self, today: NaiveDate) -> Result<CustomerDetails, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let first_name = parse_name("first_name", &self.first_name)
            .map_err(|e| errors.push(e))
            .ok();
        let last_name = parse_name("last_name", &self.last_name)
            .map_err(|e| errors.push(e))
            .ok();
        let dob_ok = check_date_of_birth(self.date_of_birth, today)
            .map_err(|e| errors.push(e))
            .is_ok();
        let phone_number = PhoneNumber::parse(&self.phone_number)
            .map_err(|e| errors.push(e))
            .ok();
        let email = Email::parse(&self.email).map_err(|e| errors.push(e)).ok();
        let bank_account_number = parse_bank_account_number(&self.bank_account_number)
            .map_err(|e| errors.push(e))
            .ok();

        match (first_name, last_name, phone_number, email, bank_account_number) {
            (
                Some(first_name),
                Some(last_name),
                Some(phone_number),
                Some(email),
                Some(bank_account_number),
            ) if dob_ok => Ok(CustomerDetails {
                first_name,
                last_name,
                date_of_birth: self.date_of_birth,
                phone_number,
                email,
                bank_account_number,
            }),
            _ => Err(errors),
        }
    }
}

/// Command to create a new customer.
#[derive(Debug, Clone)]
pub struct CreateCustomer {
    pub customer_id: AggregateId,
    pub input: CustomerInput,
}

impl CreateCustomer {
    /// Creates a new CreateCustomer command with a generated id.
    pub fn new(input: CustomerInput) -> Self {
        Self {
            customer_id: AggregateId::new(),
            input,
        }
    }

    pub fn with_id(customer_id: AggregateId, input: CustomerInput) -> Self {
        Self { customer_id, input }
    }
}

/// Command to replace a customer's details.
#[derive(Debug, Clone)]
pub struct UpdateCustomer {
    pub customer_id: AggregateId,
    pub input: CustomerInput,

    /// When set, the update only applies if the customer is still at this
    /// version.
    pub expected_version: Option<Version>,
}

impl UpdateCustomer {
    pub fn new(customer_id: AggregateId, input: CustomerInput) -> Self {
        Self {
            customer_id,
            input,
            expected_version: None,
        }
    }

    /// Requires the customer to be at `version` when the update runs.
    pub fn expecting(mut self, version: Version) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Command to soft-delete a customer.
#[derive(Debug, Clone, Copy)]
pub struct DeleteCustomer {
    pub customer_id: AggregateId,
}

impl DeleteCustomer {
    pub fn new(customer_id: AggregateId) -> Self {
        Self { customer_id }
    }
}
