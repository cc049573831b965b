//! Maintenance entry point: migrates the database and brings the customer
//! read model up to date with the event log.

use customers::{Config, CustomerRepository};
use event_store::PostgresEventStore;
use projections::PostgresCustomerReadModel;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    customers::telemetry::init_tracing(&config);

    let database_url = config
        .database_url
        .as_deref()
        .ok_or("DATABASE_URL must be set")?;

    // 2. Connect
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await?;
    let store = PostgresEventStore::new(pool.clone());

    // 3. Apply migrations
    if config.run_migrations {
        store.run_migrations().await?;
        tracing::info!("migrations applied");
    }

    // 4. Project anything the read model is missing
    let repository = CustomerRepository::new(store, PostgresCustomerReadModel::new(pool.clone()));
    let report = repository.catch_up().await?;
    tracing::info!(
        entities_scanned = report.entities_scanned,
        entities_updated = report.entities_updated,
        events_projected = report.events_projected,
        "customer read model is up to date"
    );

    pool.close().await;
    Ok(())
}
