use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Result, Version,
    store::{EventStore, validate_append},
    transaction::{Transaction, TransactionManager},
};

/// Name of the unique index on `(entity_id, version)`.
const UNIQUE_ENTITY_VERSION: &str = "unique_entity_version";

/// An open PostgreSQL transaction.
///
/// Read-model writers borrow the connection to run their statements inside
/// the same transaction as the appended events.
pub struct PgTransaction(sqlx::Transaction<'static, Postgres>);

impl PgTransaction {
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.0
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(self) -> Result<()> {
        self.0.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.0.rollback().await?;
        Ok(())
    }
}

/// PostgreSQL-backed event store implementation.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        Ok(EventEnvelope {
            id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            entity_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("entity_id")?),
            entity_type: row.try_get("entity_type")?,
            kind: row.try_get("kind")?,
            payload: row.try_get("payload")?,
            version: Version::new(row.try_get("version")?),
            occurred_on: row.try_get("occurred_on")?,
        })
    }
}

#[async_trait]
impl TransactionManager for PostgresEventStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        Ok(PgTransaction(self.pool.begin().await?))
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, tx, events), fields(count = events.len()))]
    async fn append(
        &self,
        tx: &mut PgTransaction,
        entity_id: AggregateId,
        entity_type: &str,
        events: Vec<EventEnvelope>,
        expected_version: Version,
    ) -> Result<Version> {
        let last_version = validate_append(entity_id, entity_type, &events, expected_version)?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE entity_id = $1")
                .bind(entity_id.as_uuid())
                .fetch_one(tx.connection())
                .await?;

        let actual = Version::new(current_version.unwrap_or(0));
        if actual != expected_version {
            metrics::counter!("event_store_concurrency_conflicts").increment(1);
            return Err(EventStoreError::ConcurrencyConflict {
                entity_id,
                expected: expected_version,
                actual,
            });
        }

        for event in &events {
            sqlx::query(
                r#"
                INSERT INTO events (id, entity_id, entity_type, kind, payload, version, occurred_on)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(event.id.as_uuid())
            .bind(event.entity_id.as_uuid())
            .bind(&event.entity_type)
            .bind(&event.kind)
            .bind(&event.payload)
            .bind(event.version.as_i64())
            .bind(event.occurred_on)
            .execute(tx.connection())
            .await
            .map_err(|e| {
                // A concurrent writer inserted the same version first
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some(UNIQUE_ENTITY_VERSION)
                {
                    metrics::counter!("event_store_concurrency_conflicts").increment(1);
                    return EventStoreError::ConcurrencyConflict {
                        entity_id,
                        expected: expected_version,
                        actual: event.version,
                    };
                }
                EventStoreError::Database(e)
            })?;
        }

        metrics::counter!("event_store_events_appended").increment(events.len() as u64);
        Ok(last_version)
    }

    async fn load_from(
        &self,
        entity_id: AggregateId,
        after: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT id, entity_id, entity_type, kind, payload, version, occurred_on
            FROM events
            WHERE entity_id = $1 AND version > $2
            ORDER BY version ASC
            "#,
        )
        .bind(entity_id.as_uuid())
        .bind(after.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn list_entity_ids(&self, entity_type: &str) -> Result<Vec<AggregateId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT entity_id
            FROM events
            WHERE entity_type = $1
            GROUP BY entity_id
            ORDER BY MIN(occurred_on), entity_id
            "#,
        )
        .bind(entity_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(AggregateId::from_uuid).collect())
    }

    async fn entity_version(&self, entity_id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE entity_id = $1")
                .bind(entity_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }
}
