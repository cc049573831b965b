use chrono::{DateTime, NaiveDate, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::read_model::ReadModelRow;

/// Query-optimized view of one customer.
///
/// `version` is the version of the last event applied to the row, so it
/// always matches the entity's stream version once projection commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerReadModel {
    pub id: AggregateId,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub phone_number: String,
    pub email: String,
    pub bank_account_number: String,
    pub version: Version,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CustomerReadModel {
    /// Whether the row holds the same first name, last name and date of
    /// birth.
    pub fn has_name_and_dob(
        &self,
        first_name: &str,
        last_name: &str,
        date_of_birth: NaiveDate,
    ) -> bool {
        self.first_name == first_name
            && self.last_name == last_name
            && self.date_of_birth == date_of_birth
    }
}

impl ReadModelRow for CustomerReadModel {
    fn id(&self) -> AggregateId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }
}
