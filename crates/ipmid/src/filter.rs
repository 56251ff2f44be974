//! Pre-dispatch filter chain.
//!
//! Filters run in descending priority order; among equal priorities the
//! earlier registration runs first. The first filter returning anything other
//! than success decides the outcome and later filters are skipped.

use std::fmt;

use tracing::debug;

use crate::message::{CompletionCode, Priority, Request};

const FILTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::filter");

/// Inspects a request before dispatch.
///
/// Filters never suspend; they decide from the request alone.
pub trait CommandFilter {
    /// Returns [`CompletionCode::SUCCESS`] to let the request through, or the
    /// code to reject it with.
    fn filter(&self, request: &Request) -> CompletionCode;
}

impl<F> CommandFilter for F
where
    F: Fn(&Request) -> CompletionCode,
{
    fn filter(&self, request: &Request) -> CompletionCode {
        self(request)
    }
}

struct FilterEntry {
    priority: Priority,
    filter: Box<dyn CommandFilter>,
}

/// Ordered collection of [`CommandFilter`]s.
#[derive(Default)]
pub struct FilterChain {
    entries: Vec<FilterEntry>,
}

impl FilterChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `filter` after every entry with priority greater than or equal
    /// to `priority`.
    pub fn register<F>(&mut self, priority: Priority, filter: F)
    where
        F: CommandFilter + 'static,
    {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.priority < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            position,
            FilterEntry {
                priority,
                filter: Box::new(filter),
            },
        );
        debug!(target: FILTER_TARGET, priority, position, "filter registered");
    }

    /// Runs the chain; `None` means no filter objected.
    #[must_use]
    pub fn run(&self, request: &Request) -> Option<CompletionCode> {
        self.entries.iter().find_map(|entry| {
            let cc = entry.filter.filter(request);
            (!cc.is_success()).then_some(cc)
        })
    }

    /// Drops every filter.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of registered filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no filter is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let priorities: Vec<Priority> = self.entries.iter().map(|entry| entry.priority).collect();
        formatter
            .debug_struct("FilterChain")
            .field("priorities", &priorities)
            .finish()
    }
}
