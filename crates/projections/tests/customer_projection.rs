//! Projection of customer events inside the appending transaction, and
//! catch-up of a read model that fell behind the log.

use chrono::NaiveDate;
use common::AggregateId;
use domain::{
    Aggregate, CUSTOMER_CREATED, CUSTOMER_DELETED, Customer, CustomerEvent, CustomerInput, Tracked,
};
use event_store::{
    Coordinator, EventStore, EventStoreError, EventStoreExt, InMemoryEventStore, Transaction,
    TransactionManager, Version,
};
use projections::customers::{on_created, on_deleted};
use projections::{
    CustomerProcessor, CustomerQueries, CustomerReadModel, CustomerTable,
    InMemoryCustomerReadModel, ProjectedEvent, ProjectionError, ProjectionProcessor,
    ProjectionRegistry, RowSet, customer_registry,
};

type Store = InMemoryEventStore<CustomerTable>;
type Processor = CustomerProcessor<InMemoryCustomerReadModel>;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

fn input(first_name: &str, email: &str) -> CustomerInput {
    CustomerInput {
        first_name: first_name.to_string(),
        last_name: "Hopper".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1985, 12, 9).unwrap(),
        phone_number: "+1 (555) 123-4567".to_string(),
        email: email.to_string(),
        bank_account_number: "9876543210".to_string(),
    }
}

fn setup(
    registry: ProjectionRegistry<CustomerEvent, CustomerReadModel>,
) -> (Store, InMemoryCustomerReadModel, Processor) {
    let store = Store::default();
    let model = InMemoryCustomerReadModel::new(store.clone());
    let processor = ProjectionProcessor::new(registry, model.clone());
    (store, model, processor)
}

fn new_customer(first_name: &str, email: &str) -> (AggregateId, Tracked<Customer>) {
    let id = AggregateId::new();
    let mut customer = Tracked::<Customer>::new();
    customer
        .execute(|c| c.create(id, &input(first_name, email), today()))
        .unwrap();
    (id, customer)
}

/// Appends and projects the pending events in one transaction.
async fn save(
    store: &Store,
    processor: &Processor,
    id: AggregateId,
    customer: &mut Tracked<Customer>,
) -> Result<(), ProjectionError> {
    let mut tx = store.begin().await?;
    store
        .append_records(
            &mut tx,
            id,
            Customer::aggregate_type(),
            customer.pending(),
            customer.expected_version(),
        )
        .await?;
    processor.project(&mut tx, id, customer.pending()).await?;
    tx.commit().await?;
    customer.clear_pending();
    Ok(())
}

/// Appends the pending events without touching the read model.
async fn append_only(store: &Store, id: AggregateId, customer: &mut Tracked<Customer>) {
    let mut tx = store.begin().await.unwrap();
    store
        .append_records(
            &mut tx,
            id,
            Customer::aggregate_type(),
            customer.pending(),
            customer.expected_version(),
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();
    customer.clear_pending();
}

#[tokio::test]
async fn created_customer_has_row_at_version_one() {
    let (store, model, processor) = setup(customer_registry());
    let (id, mut customer) = new_customer("Grace", "grace@example.com");

    save(&store, &processor, id, &mut customer).await.unwrap();

    let row = model.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(row.version, Version::first());
    assert!(!row.is_deleted);
    assert_eq!(row.email, "grace@example.com");
    assert_eq!(row.phone_number, "+15551234567");
    assert_eq!(store.entity_version(id).await.unwrap(), Some(Version::first()));
}

#[tokio::test]
async fn handler_failure_rolls_back_the_append() {
    fn reject(
        _: &ProjectedEvent<'_, CustomerEvent>,
        _: &mut RowSet<CustomerReadModel>,
    ) -> projections::Result<()> {
        Err(ProjectionError::Handler {
            handler: "reject",
            kind: "CustomerUpdated",
            message: "read model unavailable".to_string(),
        })
    }

    let registry = customer_registry().on("CustomerUpdated", "reject", reject);
    let (store, model, processor) = setup(registry);
    let (id, mut customer) = new_customer("Grace", "grace@example.com");
    save(&store, &processor, id, &mut customer).await.unwrap();

    customer
        .execute(|c| c.update(&input("Grace", "hopper@example.com"), today()))
        .unwrap();
    let records = customer.pending().to_vec();
    let expected = customer.expected_version();

    let coordinator = Coordinator::new(store.clone());
    let work_store = store.clone();
    let result: Result<usize, ProjectionError> = coordinator
        .run_in_transaction(move |tx| {
            Box::pin(async move {
                work_store
                    .append_records(tx, id, Customer::aggregate_type(), &records, expected)
                    .await?;
                processor.project(tx, id, &records).await
            })
        })
        .await;

    assert!(matches!(
        result,
        Err(ProjectionError::Handler { handler: "reject", .. })
    ));
    assert_eq!(store.entity_version(id).await.unwrap(), Some(Version::first()));
    let row = model.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(row.version, Version::first());
    assert_eq!(row.email, "grace@example.com");
}

#[tokio::test]
async fn unmapped_kind_is_skipped_and_the_batch_commits() {
    let registry = ProjectionRegistry::<CustomerEvent, CustomerReadModel>::new()
        .on(CUSTOMER_CREATED, "customer_created", on_created)
        .on(CUSTOMER_DELETED, "customer_deleted", on_deleted);
    let (store, model, processor) = setup(registry);

    let (id, mut customer) = new_customer("Grace", "grace@example.com");
    customer
        .execute(|c| c.update(&input("Grace", "hopper@example.com"), today()))
        .unwrap();
    save(&store, &processor, id, &mut customer).await.unwrap();

    assert_eq!(store.entity_version(id).await.unwrap(), Some(Version::new(2)));
    let row = model.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(row.version, Version::first());
    assert_eq!(row.email, "grace@example.com");

    customer.execute(|c| c.delete()).unwrap();
    save(&store, &processor, id, &mut customer).await.unwrap();
    assert_eq!(model.find_by_id(id).await.unwrap(), None);
    assert_eq!(model.row(id).await.unwrap().version, Version::new(3));
}

#[tokio::test]
async fn read_model_conflict_discards_the_events_too() {
    let (store, model, processor) = setup(customer_registry());
    let (first, mut grace) = new_customer("Grace", "shared@example.com");
    save(&store, &processor, first, &mut grace).await.unwrap();

    let (second, mut ada) = new_customer("Ada", "shared@example.com");
    let err = save(&store, &processor, second, &mut ada)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProjectionError::EventStore(EventStoreError::UniqueViolation { .. })
    ));
    assert_eq!(store.entity_version(second).await.unwrap(), None);
    assert_eq!(model.row(second).await, None);
    assert_eq!(store.event_count().await, 1);
}

#[tokio::test]
async fn several_events_in_one_batch_flush_once() {
    let (store, model, processor) = setup(customer_registry());
    let (id, mut customer) = new_customer("Grace", "grace@example.com");
    for n in 0..3 {
        let email = format!("grace{n}@example.com");
        customer
            .execute(|c| c.update(&input("Grace", &email), today()))
            .unwrap();
    }

    save(&store, &processor, id, &mut customer).await.unwrap();

    let row = model.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(row.version, Version::new(4));
    assert_eq!(row.email, "grace2@example.com");
}

#[tokio::test]
async fn catch_up_projects_missing_events_once() {
    let (store, model, processor) = setup(customer_registry());

    let (id, mut customer) = new_customer("Grace", "grace@example.com");
    customer
        .execute(|c| c.update(&input("Grace", "hopper@example.com"), today()))
        .unwrap();
    append_only(&store, id, &mut customer).await;
    let (other, mut ada) = new_customer("Ada", "ada@example.com");
    append_only(&store, other, &mut ada).await;
    assert_eq!(model.row(id).await, None);

    let report = processor
        .run_catch_up(&store, Customer::aggregate_type())
        .await
        .unwrap();
    assert_eq!(report.entities_scanned, 2);
    assert_eq!(report.entities_updated, 2);
    assert_eq!(report.events_projected, 3);

    let row = model.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(row.version, Version::new(2));
    assert_eq!(row.email, "hopper@example.com");

    let again = processor
        .run_catch_up(&store, Customer::aggregate_type())
        .await
        .unwrap();
    assert_eq!(again.entities_scanned, 2);
    assert_eq!(again.events_projected, 0);
    assert_eq!(again.entities_updated, 0);
}

#[tokio::test]
async fn catch_up_resumes_after_the_row_version() {
    let (store, model, processor) = setup(customer_registry());
    let (id, mut customer) = new_customer("Grace", "grace@example.com");
    save(&store, &processor, id, &mut customer).await.unwrap();

    customer.execute(|c| c.delete()).unwrap();
    append_only(&store, id, &mut customer).await;

    let report = processor
        .run_catch_up(&store, Customer::aggregate_type())
        .await
        .unwrap();

    assert_eq!(report.events_projected, 1);
    let row = model.row(id).await.unwrap();
    assert!(row.is_deleted);
    assert_eq!(row.version, Version::new(2));
}

#[tokio::test]
async fn stale_catch_up_cannot_overwrite_a_newer_row() {
    let (store, model, processor) = setup(customer_registry());
    let (id, mut customer) = new_customer("Grace", "grace@example.com");
    save(&store, &processor, id, &mut customer).await.unwrap();

    customer
        .execute(|c| c.update(&input("Grace", "v2@example.com"), today()))
        .unwrap();
    let missed = customer.pending().to_vec();
    append_only(&store, id, &mut customer).await;

    let mut catch_up = store.begin().await.unwrap();
    processor.project(&mut catch_up, id, &missed).await.unwrap();

    customer
        .execute(|c| c.update(&input("Grace", "v3@example.com"), today()))
        .unwrap();
    save(&store, &processor, id, &mut customer).await.unwrap();

    let err = catch_up.commit().await.unwrap_err();
    assert!(matches!(
        err,
        EventStoreError::ConcurrencyConflict { expected, actual, .. }
            if expected == Version::first() && actual == Version::new(3)
    ));

    let row = model.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(row.version, Version::new(3));
    assert_eq!(row.email, "v3@example.com");
    assert_eq!(store.entity_version(id).await.unwrap(), Some(Version::new(3)));
}
