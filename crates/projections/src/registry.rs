//! Event kind to handler mapping, built once at startup.

use std::collections::HashMap;
use std::fmt;

use common::AggregateId;
use event_store::Recorded;

use crate::{Result, read_model::RowSet};

/// An event handed to projection handlers.
#[derive(Debug)]
pub struct ProjectedEvent<'a, E> {
    pub entity_id: AggregateId,
    pub record: &'a Recorded<E>,
}

/// A projection handler: a deterministic mutation of the rows in a batch.
pub type Handler<E, R> = fn(&ProjectedEvent<'_, E>, &mut RowSet<R>) -> Result<()>;

/// A named handler, as stored in the registry.
pub struct Registration<E, R> {
    pub name: &'static str,
    pub handler: Handler<E, R>,
}

impl<E, R> Clone for Registration<E, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            handler: self.handler,
        }
    }
}

/// Maps each event kind to the ordered list of handlers for it.
///
/// The registry is populated explicitly and never consulted for anything
/// other than lookups by kind.
pub struct ProjectionRegistry<E, R> {
    handlers: HashMap<&'static str, Vec<Registration<E, R>>>,
}

impl<E, R> Default for ProjectionRegistry<E, R> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<E, R> ProjectionRegistry<E, R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler for `kind`, after any handlers already registered.
    pub fn on(mut self, kind: &'static str, name: &'static str, handler: Handler<E, R>) -> Self {
        self.handlers
            .entry(kind)
            .or_default()
            .push(Registration { name, handler });
        self
    }

    /// Handlers for `kind` in registration order; empty when unmapped.
    pub fn handlers_for(&self, kind: &str) -> &[Registration<E, R>] {
        self.handlers.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_mapped(&self, kind: &str) -> bool {
        !self.handlers_for(kind).is_empty()
    }
}

impl<E, R> fmt::Debug for ProjectionRegistry<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (kind, handlers) in &self.handlers {
            let names: Vec<_> = handlers.iter().map(|h| h.name).collect();
            map.entry(kind, &names);
        }
        map.finish()
    }
}
