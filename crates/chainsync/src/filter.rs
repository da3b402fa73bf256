//! Filters and the ordered filter chain.
//!
//! Every transaction of a work unit is handed to every registered filter: transactions in
//! increasing index order, filters in registration order. Delivery is at-least-once (a unit
//! whose dispatch or commit failed is dispatched again from its first transaction), so
//! filters must tolerate replay.

use crate::source::{Transaction, WorkUnit};
use thiserror::Error;

/// Per-transaction context passed to filters.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub block_height: u64,
    pub unit: &'a WorkUnit,
}

impl FilterContext<'_> {
    pub fn transaction_count(&self) -> usize {
        self.unit.transactions().len()
    }
}

/// Inspects a transaction and optionally acts on it.
pub trait Filter: Send {
    fn handle(&mut self, tx: &Transaction, ctx: &FilterContext<'_>) -> anyhow::Result<()>;

    /// Name used in logs and dispatch errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Filter that does nothing and never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFilter;

impl Filter for NoopFilter {
    fn handle(&mut self, _tx: &Transaction, _ctx: &FilterContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Named filter backed by a closure.
pub struct FnFilter<F> {
    name: String,
    f: F,
}

impl<F> FnFilter<F>
where
    F: FnMut(&Transaction, &FilterContext<'_>) -> anyhow::Result<()> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Filter for FnFilter<F>
where
    F: FnMut(&Transaction, &FilterContext<'_>) -> anyhow::Result<()> + Send,
{
    fn handle(&mut self, tx: &Transaction, ctx: &FilterContext<'_>) -> anyhow::Result<()> {
        (self.f)(tx, ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A filter failed; the unit was not fully dispatched.
#[derive(Debug, Error)]
#[error("filter {filter} failed on block {block_height} transaction {transaction_index}: {source}")]
pub struct DispatchError {
    pub filter: String,
    pub block_height: u64,
    pub transaction_index: u64,
    #[source]
    pub source: anyhow::Error,
}

/// Ordered list of filters. No dedup, no priority.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_filter(&mut self, filter: impl Filter + 'static) {
        self.filters.push(Box::new(filter));
    }

    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.add_filter(filter);
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Filter names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Dispatch every transaction of `unit` with index `>= first_tx` through every filter.
    /// Stops at the first failing filter. Returns the number of transactions dispatched.
    pub fn dispatch(&mut self, unit: &WorkUnit, first_tx: u64) -> Result<usize, DispatchError> {
        let ctx = FilterContext {
            block_height: unit.height(),
            unit,
        };
        let mut dispatched = 0;
        for tx in unit.transactions().iter().filter(|tx| tx.index >= first_tx) {
            for filter in self.filters.iter_mut() {
                if let Err(source) = filter.handle(tx, &ctx) {
                    return Err(DispatchError {
                        filter: filter.name().to_string(),
                        block_height: unit.height(),
                        transaction_index: tx.index,
                        source,
                    });
                }
            }
            dispatched += 1;
        }
        tracing::trace!(
            height = unit.height(),
            dispatched,
            filters = self.filters.len(),
            "unit dispatched"
        );
        Ok(dispatched)
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.names())
            .finish()
    }
}
