//! PostgreSQL-backed customer read model.

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{AggregateId, Page, PageRequest};
use event_store::{EventStoreError, PgTransaction, Version};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{CustomerQueries, CustomerReadModel};
use crate::read_model::{ReadModelWriter, RowChange};
use crate::{ProjectionError, Result};

const COLUMNS: &str = "id, first_name, last_name, date_of_birth, phone_number, email, \
                       bank_account_number, version, is_deleted, created_at, updated_at";

/// First non-deleted row matching `filter`, in listing order.
fn select_active(filter: &str) -> String {
    format!(
        "SELECT {COLUMNS} FROM customer_read_models \
         WHERE {filter} AND NOT is_deleted \
         ORDER BY created_at, id LIMIT 1"
    )
}

/// Customer read model stored in the `customer_read_models` table.
///
/// Writes run on the connection of the transaction that appends the
/// events; queries run on the pool.
#[derive(Clone)]
pub struct PostgresCustomerReadModel {
    pool: PgPool,
}

impl PostgresCustomerReadModel {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Version of the row for `id` as seen by `tx`.
    async fn current_version(tx: &mut PgTransaction, id: AggregateId) -> Result<Version> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM customer_read_models WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(tx.connection())
                .await?;
        Ok(version.map_or(Version::initial(), Version::new))
    }

    fn row_to_customer(row: PgRow) -> Result<CustomerReadModel> {
        Ok(CustomerReadModel {
            id: AggregateId::from_uuid(row.try_get::<Uuid, _>("id")?),
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            date_of_birth: row.try_get("date_of_birth")?,
            phone_number: row.try_get("phone_number")?,
            email: row.try_get("email")?,
            bank_account_number: row.try_get("bank_account_number")?,
            version: Version::new(row.try_get("version")?),
            is_deleted: row.try_get("is_deleted")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Turns a violated unique index into a typed error.
fn map_write_error(err: sqlx::Error) -> ProjectionError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return ProjectionError::UniqueViolation {
            constraint: db_err.constraint().unwrap_or_default().to_string(),
        };
    }
    ProjectionError::Database(err)
}

#[async_trait]
impl ReadModelWriter<CustomerReadModel> for PostgresCustomerReadModel {
    type Tx = PgTransaction;

    async fn load_for_update(
        &self,
        tx: &mut PgTransaction,
        id: AggregateId,
    ) -> Result<Option<CustomerReadModel>> {
        let sql = format!("SELECT {COLUMNS} FROM customer_read_models WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(tx.connection())
            .await?;
        row.map(Self::row_to_customer).transpose()
    }

    #[tracing::instrument(skip(self, tx, changes), fields(count = changes.len()))]
    async fn flush(
        &self,
        tx: &mut PgTransaction,
        changes: Vec<RowChange<CustomerReadModel>>,
    ) -> Result<()> {
        for change in changes {
            let query = match &change {
                RowChange::Insert(_) => sqlx::query(
                    r#"
                    INSERT INTO customer_read_models
                        (id, first_name, last_name, date_of_birth, phone_number, email,
                         bank_account_number, version, is_deleted, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    "#,
                ),
                RowChange::Update { .. } => sqlx::query(
                    r#"
                    UPDATE customer_read_models
                    SET first_name = $2, last_name = $3, date_of_birth = $4,
                        phone_number = $5, email = $6, bank_account_number = $7,
                        version = $8, is_deleted = $9, created_at = $10, updated_at = $11
                    WHERE id = $1 AND version = $12
                    "#,
                ),
            };

            let row = change.row();
            let mut query = query
                .bind(row.id.as_uuid())
                .bind(&row.first_name)
                .bind(&row.last_name)
                .bind(row.date_of_birth)
                .bind(&row.phone_number)
                .bind(&row.email)
                .bind(&row.bank_account_number)
                .bind(row.version.as_i64())
                .bind(row.is_deleted)
                .bind(row.created_at)
                .bind(row.updated_at);
            if let RowChange::Update { loaded, .. } = &change {
                query = query.bind(loaded.as_i64());
            }
            let result = query
                .execute(tx.connection())
                .await
                .map_err(map_write_error)?;

            if let RowChange::Update { loaded, .. } = &change
                && result.rows_affected() == 0
            {
                return Err(EventStoreError::ConcurrencyConflict {
                    entity_id: row.id,
                    expected: *loaded,
                    actual: Self::current_version(tx, row.id).await?,
                }
                .into());
            }
        }
        Ok(())
    }

    async fn row_version(&self, id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM customer_read_models WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(version.map(Version::new))
    }
}

#[async_trait]
impl CustomerQueries for PostgresCustomerReadModel {
    async fn find_by_id(&self, id: AggregateId) -> Result<Option<CustomerReadModel>> {
        let row = sqlx::query(&select_active("id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_customer).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<CustomerReadModel>> {
        let row = sqlx::query(&select_active("email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_customer).transpose()
    }

    async fn find_by_phone_number(
        &self,
        phone_number: &str,
    ) -> Result<Option<CustomerReadModel>> {
        let row = sqlx::query(&select_active("phone_number = $1"))
            .bind(phone_number)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_customer).transpose()
    }

    async fn find_by_name_and_dob(
        &self,
        first_name: &str,
        last_name: &str,
        date_of_birth: NaiveDate,
    ) -> Result<Option<CustomerReadModel>> {
        let sql = select_active("first_name = $1 AND last_name = $2 AND date_of_birth = $3");
        let row = sqlx::query(&sql)
            .bind(first_name)
            .bind(last_name)
            .bind(date_of_birth)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_customer).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_page(&self, request: PageRequest) -> Result<Page<CustomerReadModel>> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM customer_read_models WHERE NOT is_deleted")
                .fetch_one(&self.pool)
                .await?;

        let sql = format!(
            "SELECT {COLUMNS} FROM customer_read_models \
             WHERE NOT is_deleted \
             ORDER BY created_at, id \
             LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(request.page_size()))
            .bind(i64::try_from(request.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .into_iter()
            .map(Self::row_to_customer)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(
            items,
            u64::try_from(total).unwrap_or_default(),
            request,
        ))
    }
}
