//! Customer repository: commands go through the event log, reads through the
//! read model.

use std::sync::Arc;

use chrono::NaiveDate;
use common::{AggregateId, Page, PageRequest};
use domain::{
    Aggregate, Clock, CreateCustomer, Customer, CustomerDetails, CustomerEvent, DeleteCustomer,
    PhoneNumber, SystemClock, Tracked, UpdateCustomer,
};
use event_store::{Coordinator, EventStore, EventStoreExt};
use projections::{
    CatchUpReport, CustomerProcessor, CustomerQueries, CustomerReadModel, ProjectionProcessor,
    ProjectionRegistry, ReadModelWriter, customer_registry,
};

use crate::{RepositoryError, Result};

/// Facade over the event store and the customer read model.
///
/// Every command appends its events and projects them in one transaction,
/// so a committed write is immediately visible to lookups.
#[derive(Clone)]
pub struct CustomerRepository<S, W> {
    coordinator: Coordinator<S>,
    processor: CustomerProcessor<W>,
    clock: Arc<dyn Clock>,
}

impl<S, W> CustomerRepository<S, W>
where
    S: EventStore + Clone + 'static,
    W: ReadModelWriter<CustomerReadModel, Tx = S::Tx> + CustomerQueries + Clone + 'static,
{
    /// Creates a repository projecting every customer event kind.
    pub fn new(store: S, read_model: W) -> Self {
        Self::with_registry(store, read_model, customer_registry())
    }

    pub fn with_registry(
        store: S,
        read_model: W,
        registry: ProjectionRegistry<CustomerEvent, CustomerReadModel>,
    ) -> Self {
        Self {
            coordinator: Coordinator::new(store),
            processor: ProjectionProcessor::new(registry, read_model),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for date-dependent validation.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &S {
        self.coordinator.manager()
    }

    pub fn read_model(&self) -> &W {
        self.processor.writer()
    }

    /// Rebuilds a customer from its full history.
    ///
    /// Customers with no events and deleted customers are not found.
    #[tracing::instrument(skip(self))]
    pub async fn get_by_id(&self, id: AggregateId) -> Result<Tracked<Customer>> {
        let envelopes = self.store().load_all(id).await?;
        if envelopes.is_empty() {
            return Err(RepositoryError::NotFound { id });
        }

        let customer = Tracked::<Customer>::from_envelopes(envelopes)?;
        if customer.state().is_deleted() {
            return Err(RepositoryError::NotFound { id });
        }
        Ok(customer)
    }

    pub async fn find_by_id(&self, id: AggregateId) -> Result<Option<CustomerReadModel>> {
        Ok(self.read_model().find_by_id(id).await?)
    }

    /// Looks up an active customer by email, ignoring case and surrounding
    /// whitespace.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<CustomerReadModel>> {
        let email = email.trim().to_lowercase();
        Ok(self.read_model().find_by_email(&email).await?)
    }

    /// Looks up an active customer by phone number in any accepted format.
    pub async fn find_by_phone_number(
        &self,
        phone_number: &str,
    ) -> Result<Option<CustomerReadModel>> {
        let Ok(phone_number) = PhoneNumber::parse(phone_number) else {
            return Ok(None);
        };
        Ok(self
            .read_model()
            .find_by_phone_number(phone_number.as_str())
            .await?)
    }

    pub async fn find_by_name_and_dob(
        &self,
        first_name: &str,
        last_name: &str,
        date_of_birth: NaiveDate,
    ) -> Result<Option<CustomerReadModel>> {
        Ok(self
            .read_model()
            .find_by_name_and_dob(first_name.trim(), last_name.trim(), date_of_birth)
            .await?)
    }

    /// One page of active customers, oldest first. Pages start at 1.
    pub async fn list_page(&self, page: u32, page_size: u32) -> Result<Page<CustomerReadModel>> {
        let request = PageRequest::new(page, page_size)?;
        Ok(self.read_model().list_page(request).await?)
    }

    /// Creates a customer and returns its read model row.
    ///
    /// The row is `None` when the registry has no handler for the event; the
    /// customer is still created.
    #[tracing::instrument(skip(self, command), fields(customer_id = %command.customer_id))]
    pub async fn create(&self, command: CreateCustomer) -> Result<Option<CustomerReadModel>> {
        let today = self.clock.today();
        let details = command.input.validate(today)?;
        self.ensure_unique(&details, None).await?;

        let id = command.customer_id;
        let mut customer = Tracked::<Customer>::new();
        customer.execute(|c| c.create(id, &command.input, today))?;

        let row = self.save(id, &mut customer).await?;
        tracing::info!(version = %customer.version(), "Customer created");
        metrics::counter!("customers_commands_committed", "command" => "create").increment(1);
        Ok(row)
    }

    /// Replaces a customer's details and returns the row as committed.
    ///
    /// When the command carries an expected version, the update only runs
    /// if the customer is still at that version.
    #[tracing::instrument(skip(self, command), fields(customer_id = %command.customer_id))]
    pub async fn update(&self, command: UpdateCustomer) -> Result<Option<CustomerReadModel>> {
        let id = command.customer_id;
        let mut customer = self.get_by_id(id).await?;

        if let Some(expected) = command.expected_version
            && expected != customer.version()
        {
            return Err(RepositoryError::ConcurrencyConflict {
                id,
                expected,
                actual: customer.version(),
            });
        }

        let today = self.clock.today();
        let details = command.input.validate(today)?;
        self.ensure_unique(&details, Some(id)).await?;
        customer.execute(|c| c.update(&command.input, today))?;

        let row = self.save(id, &mut customer).await?;
        tracing::info!(version = %customer.version(), "Customer updated");
        metrics::counter!("customers_commands_committed", "command" => "update").increment(1);
        Ok(row)
    }

    /// Soft-deletes a customer. Its history stays in the log.
    #[tracing::instrument(skip(self, command), fields(customer_id = %command.customer_id))]
    pub async fn delete(&self, command: DeleteCustomer) -> Result<()> {
        let id = command.customer_id;
        let mut customer = self.get_by_id(id).await?;
        customer.execute(Customer::delete)?;

        self.save(id, &mut customer).await?;
        tracing::info!(version = %customer.version(), "Customer deleted");
        metrics::counter!("customers_commands_committed", "command" => "delete").increment(1);
        Ok(())
    }

    /// Projects whatever the read model is missing from the log.
    pub async fn catch_up(&self) -> Result<CatchUpReport> {
        Ok(self
            .processor
            .run_catch_up(self.store(), Customer::aggregate_type())
            .await?)
    }

    /// Fails if another active customer holds one of the business keys.
    async fn ensure_unique(
        &self,
        details: &CustomerDetails,
        exclude: Option<AggregateId>,
    ) -> Result<()> {
        let read_model = self.read_model();

        if let Some(existing) = read_model.find_by_email(details.email.as_str()).await?
            && Some(existing.id) != exclude
        {
            return Err(RepositoryError::Uniqueness { field: "email" });
        }

        if let Some(existing) = read_model
            .find_by_name_and_dob(
                &details.first_name,
                &details.last_name,
                details.date_of_birth,
            )
            .await?
            && Some(existing.id) != exclude
        {
            return Err(RepositoryError::Uniqueness {
                field: "name_and_date_of_birth",
            });
        }

        Ok(())
    }

    /// Appends the pending events at the version the customer had before
    /// them, projects them, and commits both together.
    ///
    /// Returns the row as it stands at commit.
    async fn save(
        &self,
        id: AggregateId,
        customer: &mut Tracked<Customer>,
    ) -> Result<Option<CustomerReadModel>> {
        let records = customer.pending().to_vec();
        let expected = customer.expected_version();
        let store = self.store().clone();
        let processor = self.processor.clone();

        let row = self
            .coordinator
            .run_in_transaction(move |tx| {
                Box::pin(async move {
                    store
                        .append_records(tx, id, Customer::aggregate_type(), &records, expected)
                        .await?;
                    processor.project(tx, id, &records).await?;
                    Ok::<_, RepositoryError>(processor.writer().load_for_update(tx, id).await?)
                })
            })
            .await?;

        customer.clear_pending();
        Ok(row)
    }
}
