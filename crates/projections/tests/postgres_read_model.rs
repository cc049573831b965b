//! PostgreSQL read-model integration tests
//!
//! These tests use a shared PostgreSQL container and need a running Docker
//! daemon. Run with:
//!
//! ```bash
//! cargo test -p projections --test postgres_read_model -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::NaiveDate;
use common::{AggregateId, PageRequest};
use domain::{Aggregate, Customer, CustomerInput, Tracked};
use event_store::{
    EventStore, EventStoreError, EventStoreExt, PostgresEventStore, Transaction,
    TransactionManager, Version,
};
use projections::customers::EMAIL_UNIQUE;
use projections::{
    CustomerProcessor, CustomerQueries, PostgresCustomerReadModel, ProjectionError,
    ProjectionProcessor, ReadModelWriter, RowChange, customer_registry,
};
use serial_test::serial;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let pool = sqlx::PgPool::connect(&connection_string).await.unwrap();
            PostgresEventStore::new(pool.clone())
                .run_migrations()
                .await
                .unwrap();
            pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

struct Fixture {
    store: PostgresEventStore,
    model: PostgresCustomerReadModel,
    processor: CustomerProcessor<PostgresCustomerReadModel>,
}

async fn fixture() -> Fixture {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE events, customer_read_models")
        .execute(&pool)
        .await
        .unwrap();

    let model = PostgresCustomerReadModel::new(pool.clone());
    Fixture {
        store: PostgresEventStore::new(pool),
        processor: ProjectionProcessor::new(customer_registry(), model.clone()),
        model,
    }
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

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

async fn save(
    fx: &Fixture,
    id: AggregateId,
    customer: &mut Tracked<Customer>,
) -> Result<(), ProjectionError> {
    let mut tx = fx.store.begin().await?;
    fx.store
        .append_records(
            &mut tx,
            id,
            Customer::aggregate_type(),
            customer.pending(),
            customer.expected_version(),
        )
        .await?;
    fx.processor
        .project(&mut tx, id, customer.pending())
        .await?;
    tx.commit().await?;
    customer.clear_pending();
    Ok(())
}

async fn create(fx: &Fixture, first_name: &str, email: &str) -> (AggregateId, Tracked<Customer>) {
    let id = AggregateId::new();
    let mut customer = Tracked::<Customer>::new();
    customer
        .execute(|c| c.create(id, &input(first_name, email), today()))
        .unwrap();
    save(fx, id, &mut customer).await.unwrap();
    (id, customer)
}

#[tokio::test]
#[serial]
async fn projected_rows_follow_the_event_log() {
    let fx = fixture().await;
    let (id, mut customer) = create(&fx, "Grace", "grace@example.com").await;

    customer
        .execute(|c| c.update(&input("Grace", "hopper@example.com"), today()))
        .unwrap();
    save(&fx, id, &mut customer).await.unwrap();

    let row = fx.model.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(row.version, Version::new(2));
    assert_eq!(row.email, "hopper@example.com");
    assert!(row.updated_at.is_some());
    assert_eq!(
        fx.model
            .find_by_phone_number("+15551234567")
            .await
            .unwrap()
            .map(|r| r.id),
        Some(id)
    );
    assert_eq!(fx.store.entity_version(id).await.unwrap(), Some(Version::new(2)));
}

#[tokio::test]
#[serial]
async fn duplicate_active_email_rolls_back_the_append() {
    let fx = fixture().await;
    create(&fx, "Grace", "shared@example.com").await;

    let id = AggregateId::new();
    let mut other = Tracked::<Customer>::new();
    other
        .execute(|c| c.create(id, &input("Ada", "shared@example.com"), today()))
        .unwrap();
    let err = save(&fx, id, &mut other).await.unwrap_err();

    assert!(matches!(
        err,
        ProjectionError::UniqueViolation { ref constraint } if constraint == EMAIL_UNIQUE
    ));
    assert_eq!(fx.store.entity_version(id).await.unwrap(), None);
}

#[tokio::test]
#[serial]
async fn deleted_customer_releases_its_email() {
    let fx = fixture().await;
    let (id, mut customer) = create(&fx, "Grace", "grace@example.com").await;

    customer.execute(|c| c.delete()).unwrap();
    save(&fx, id, &mut customer).await.unwrap();
    assert_eq!(fx.model.find_by_email("grace@example.com").await.unwrap(), None);

    let (again, _) = create(&fx, "Grace", "grace@example.com").await;
    let found = fx.model.find_by_email("grace@example.com").await.unwrap();
    assert_eq!(found.map(|r| r.id), Some(again));
}

#[tokio::test]
#[serial]
async fn list_page_skips_deleted_rows() {
    let fx = fixture().await;
    let mut ids = Vec::new();
    for name in ["Ada", "Barbara", "Edsger"] {
        let email = format!("{}@example.com", name.to_lowercase());
        ids.push(create(&fx, name, &email).await);
    }
    let (deleted, mut customer) = ids.remove(1);
    customer.execute(|c| c.delete()).unwrap();
    save(&fx, deleted, &mut customer).await.unwrap();

    let page = fx
        .model
        .list_page(PageRequest::new(1, 10).unwrap())
        .await
        .unwrap();

    assert_eq!(page.total_count, 2);
    let listed: Vec<_> = page.items.iter().map(|r| r.id).collect();
    assert_eq!(listed, ids.iter().map(|(id, _)| *id).collect::<Vec<_>>());
}

#[tokio::test]
#[serial]
async fn catch_up_rebuilds_truncated_read_model() {
    let fx = fixture().await;
    create(&fx, "Grace", "grace@example.com").await;
    create(&fx, "Ada", "ada@example.com").await;

    sqlx::query("TRUNCATE TABLE customer_read_models")
        .execute(fx.store.pool())
        .await
        .unwrap();

    let report = fx
        .processor
        .run_catch_up(&fx.store, Customer::aggregate_type())
        .await
        .unwrap();
    assert_eq!(report.events_projected, 2);

    let page = fx
        .model
        .list_page(PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total_count, 2);
}

#[tokio::test]
#[serial]
async fn update_loaded_at_an_older_version_is_refused() {
    let fx = fixture().await;
    let (id, mut customer) = create(&fx, "Grace", "grace@example.com").await;
    customer
        .execute(|c| c.update(&input("Grace", "hopper@example.com"), today()))
        .unwrap();
    save(&fx, id, &mut customer).await.unwrap();

    let mut stale = fx.model.find_by_id(id).await.unwrap().unwrap();
    stale.email = "stale@example.com".to_string();
    stale.version = Version::new(3);

    let mut tx = fx.store.begin().await.unwrap();
    let err = fx
        .model
        .flush(
            &mut tx,
            vec![RowChange::Update {
                row: stale,
                loaded: Version::first(),
            }],
        )
        .await
        .unwrap_err();
    tx.rollback().await.unwrap();

    assert!(matches!(
        err,
        ProjectionError::EventStore(EventStoreError::ConcurrencyConflict { expected, actual, .. })
            if expected == Version::first() && actual == Version::new(2)
    ));
    let row = fx.model.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(row.email, "hopper@example.com");
    assert_eq!(row.version, Version::new(2));
}
