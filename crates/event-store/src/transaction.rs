//! Units of work spanning the event log and anything written alongside it.

use std::fmt::Display;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::{EventStoreError, Result};

/// An open unit of work.
///
/// Dropping a transaction without committing discards everything staged in
/// it, so an early return or a cancelled future never leaves partial writes.
#[async_trait]
pub trait Transaction: Send + Sized {
    /// Makes every write staged in this transaction visible at once.
    async fn commit(self) -> Result<()>;

    /// Discards every write staged in this transaction.
    async fn rollback(self) -> Result<()>;
}

/// Something that can open transactions.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    type Tx: Transaction;

    async fn begin(&self) -> Result<Self::Tx>;
}

/// Runs work inside a transaction and guarantees it is finished.
///
/// The transaction commits when the work succeeds and is rolled back when
/// it fails; a failed rollback is logged and the original error returned.
#[derive(Debug, Clone)]
pub struct Coordinator<M> {
    manager: M,
}

impl<M: TransactionManager> Coordinator<M> {
    pub fn new(manager: M) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Begins a transaction, hands it to `work` and then commits or rolls
    /// back depending on the outcome.
    ///
    /// Errors raised while committing (for example a concurrency conflict
    /// detected at commit time) are returned to the caller.
    pub async fn run_in_transaction<T, E, F>(&self, work: F) -> std::result::Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut M::Tx) -> BoxFuture<'t, std::result::Result<T, E>> + Send,
        E: From<EventStoreError> + Display,
    {
        let mut tx = self.manager.begin().await?;

        match work(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                metrics::counter!("event_store_transactions_committed").increment(1);
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        error = %rollback_err,
                        cause = %err,
                        "Failed to roll back transaction"
                    );
                }
                metrics::counter!("event_store_transactions_rolled_back").increment(1);
                Err(err)
            }
        }
    }
}
