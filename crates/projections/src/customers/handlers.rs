//! Handlers that turn customer events into read-model row changes.

use domain::{
    CUSTOMER_CREATED, CUSTOMER_DELETED, CUSTOMER_UPDATED, CustomerCreatedData, CustomerEvent,
    CustomerUpdatedData,
};

use super::CustomerReadModel;
use crate::read_model::RowSet;
use crate::registry::{ProjectedEvent, ProjectionRegistry};
use crate::{ProjectionError, Result};

type Event<'a> = ProjectedEvent<'a, CustomerEvent>;
type Rows = RowSet<CustomerReadModel>;

/// The handlers for every customer event kind.
pub fn customer_registry() -> ProjectionRegistry<CustomerEvent, CustomerReadModel> {
    ProjectionRegistry::new()
        .on(CUSTOMER_CREATED, "customer_created", on_created)
        .on(CUSTOMER_UPDATED, "customer_updated", on_updated)
        .on(CUSTOMER_DELETED, "customer_deleted", on_deleted)
}

/// Inserts the row for a new customer at the event's version.
pub fn on_created(event: &Event<'_>, rows: &mut Rows) -> Result<()> {
    let CustomerEvent::Created(data) = &event.record.event else {
        return Err(unexpected("customer_created", CUSTOMER_CREATED, event));
    };

    rows.insert(new_row(event, data))
}

/// Overwrites the projected fields of an existing row.
pub fn on_updated(event: &Event<'_>, rows: &mut Rows) -> Result<()> {
    let CustomerEvent::Updated(data) = &event.record.event else {
        return Err(unexpected("customer_updated", CUSTOMER_UPDATED, event));
    };

    let Some(row) = rows.get_mut(event.entity_id) else {
        missing_row(event);
        return Ok(());
    };
    apply_update(row, data);
    row.version = event.record.version;
    row.updated_at = Some(event.record.occurred_on);
    Ok(())
}

/// Flags the row as deleted. The row itself is kept.
pub fn on_deleted(event: &Event<'_>, rows: &mut Rows) -> Result<()> {
    if !matches!(event.record.event, CustomerEvent::Deleted(_)) {
        return Err(unexpected("customer_deleted", CUSTOMER_DELETED, event));
    }

    let Some(row) = rows.get_mut(event.entity_id) else {
        missing_row(event);
        return Ok(());
    };
    row.is_deleted = true;
    row.version = event.record.version;
    row.updated_at = Some(event.record.occurred_on);
    Ok(())
}

fn new_row(event: &Event<'_>, data: &CustomerCreatedData) -> CustomerReadModel {
    CustomerReadModel {
        id: event.entity_id,
        first_name: data.first_name.clone(),
        last_name: data.last_name.clone(),
        date_of_birth: data.date_of_birth,
        phone_number: data.phone_number.as_str().to_string(),
        email: data.email.as_str().to_string(),
        bank_account_number: data.bank_account_number.clone(),
        version: event.record.version,
        is_deleted: false,
        created_at: event.record.occurred_on,
        updated_at: None,
    }
}

fn apply_update(row: &mut CustomerReadModel, data: &CustomerUpdatedData) {
    row.first_name = data.first_name.clone();
    row.last_name = data.last_name.clone();
    row.date_of_birth = data.date_of_birth;
    row.phone_number = data.phone_number.as_str().to_string();
    row.email = data.email.as_str().to_string();
    row.bank_account_number = data.bank_account_number.clone();
}

fn missing_row(event: &Event<'_>) {
    tracing::warn!(
        entity_id = %event.entity_id,
        kind = event.record.kind(),
        version = %event.record.version,
        "Customer read model row not found, event not applied"
    );
}

fn unexpected(handler: &'static str, expected: &str, event: &Event<'_>) -> ProjectionError {
    ProjectionError::Handler {
        handler,
        kind: event.record.kind(),
        message: format!("expected a {expected} event"),
    }
}
