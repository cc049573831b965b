//! Feeds recorded events through the registry into read-model rows.

use std::marker::PhantomData;
use std::sync::Arc;

use common::AggregateId;
use event_store::{Coordinator, EventPayload, EventStore, EventStoreExt, Recorded, Version};

use crate::Result;
use crate::read_model::{ReadModelRow, ReadModelWriter, RowSet};
use crate::registry::{ProjectedEvent, ProjectionRegistry};

/// Outcome of a catch-up run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatchUpReport {
    pub entities_scanned: usize,
    pub entities_updated: usize,
    pub events_projected: usize,
}

/// Applies events to a read model inside the caller's transaction.
///
/// The processor supports:
/// - Synchronous projection of the events a command just appended
/// - Catch-up: projects whatever the read model is missing from the log
pub struct ProjectionProcessor<E, R, W> {
    registry: Arc<ProjectionRegistry<E, R>>,
    writer: W,
    _row: PhantomData<fn() -> R>,
}

impl<E, R, W: Clone> Clone for ProjectionProcessor<E, R, W> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            writer: self.writer.clone(),
            _row: PhantomData,
        }
    }
}

impl<E, R, W> ProjectionProcessor<E, R, W>
where
    E: EventPayload,
    R: ReadModelRow,
    W: ReadModelWriter<R>,
{
    pub fn new(registry: ProjectionRegistry<E, R>, writer: W) -> Self {
        Self {
            registry: Arc::new(registry),
            writer,
            _row: PhantomData,
        }
    }

    pub fn registry(&self) -> &ProjectionRegistry<E, R> {
        &self.registry
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Projects the events of one entity and flushes the resulting row
    /// changes once, at the end of the batch.
    ///
    /// Events the row already reflects are ignored, and kinds without a
    /// handler are logged and skipped. A handler error aborts the batch
    /// before anything is flushed.
    ///
    /// Returns the number of events that reached at least one handler.
    #[tracing::instrument(skip(self, tx, records), fields(count = records.len()))]
    pub async fn project(
        &self,
        tx: &mut W::Tx,
        entity_id: AggregateId,
        records: &[Recorded<E>],
    ) -> Result<usize> {
        let mut rows = RowSet::new();
        let mut row_version = Version::initial();
        if let Some(row) = self.writer.load_for_update(tx, entity_id).await? {
            row_version = row.version();
            rows.preload(row);
        }

        let mut projected = 0;
        for record in records.iter().filter(|r| r.version > row_version) {
            let kind = record.kind();
            if !self.registry.is_mapped(kind) {
                tracing::warn!(
                    %entity_id,
                    kind,
                    version = %record.version,
                    "No projection handler registered, skipping event"
                );
                metrics::counter!("projections_events_skipped").increment(1);
                continue;
            }

            let event = ProjectedEvent { entity_id, record };
            for registration in self.registry.handlers_for(kind) {
                if let Err(err) = (registration.handler)(&event, &mut rows) {
                    tracing::error!(
                        %entity_id,
                        kind,
                        version = %record.version,
                        handler = registration.name,
                        error = %err,
                        "Projection handler failed"
                    );
                    return Err(err);
                }
            }
            metrics::counter!("projections_events_processed").increment(1);
            projected += 1;
        }

        if rows.has_changes() {
            self.writer.flush(tx, rows.into_changes()).await?;
        }

        Ok(projected)
    }
}

impl<E, R, W> ProjectionProcessor<E, R, W>
where
    E: EventPayload,
    R: ReadModelRow,
    W: ReadModelWriter<R> + Clone + 'static,
{
    /// Brings the read model up to date with the log for every entity of
    /// `entity_type`.
    ///
    /// Each entity is projected in its own transaction, starting after the
    /// version its row already has. Running it again projects nothing.
    #[tracing::instrument(skip(self, store))]
    pub async fn run_catch_up<S>(&self, store: &S, entity_type: &str) -> Result<CatchUpReport>
    where
        S: EventStore<Tx = W::Tx> + Clone,
    {
        let coordinator = Coordinator::new(store.clone());
        let mut report = CatchUpReport::default();

        for entity_id in store.list_entity_ids(entity_type).await? {
            report.entities_scanned += 1;

            let after = self
                .writer
                .row_version(entity_id)
                .await?
                .unwrap_or_else(Version::initial);
            let records: Vec<Recorded<E>> = store.load_records_from(entity_id, after).await?;
            if records.is_empty() {
                continue;
            }

            let processor = self.clone();
            let projected = coordinator
                .run_in_transaction(move |tx| {
                    Box::pin(async move { processor.project(tx, entity_id, &records).await })
                })
                .await?;

            tracing::debug!(%entity_id, %after, projected, "Entity caught up");
            report.entities_updated += 1;
            report.events_projected += projected;
        }

        tracing::info!(
            entities_scanned = report.entities_scanned,
            entities_updated = report.entities_updated,
            events_processed = report.events_projected,
            "catch-up complete"
        );

        Ok(report)
    }
}
