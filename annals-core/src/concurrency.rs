//! Conflict detection between committed and pending events.
//!
//! Before saving, the [`Context`](crate::context::Context) loads every event
//! committed after the aggregate's base version ("unseen" events) and asks a
//! [`ConcurrencyMonitor`] whether they clash with the aggregate's uncommitted
//! events. A reported conflict aborts the save before anything is written.
//!
//! # Example
//!
//! ```ignore
//! // Default: any unseen event conflicts with any pending change
//! let context = Context::new(store);
//!
//! // Opt out of detection; the store's conditional append still applies
//! let context = Context::new(store).with_monitor(Unchecked);
//! ```

use std::fmt;

use thiserror::Error;

use crate::event::{Event, EventType};

/// Message attached to every conflict raised by [`StrictConcurrencyMonitor`].
pub const STRICT_CONFLICT_MESSAGE: &str = "Changes conflict with one or more committed events.";

/// Pure conflict check over two event sequences.
pub trait ConcurrencyMonitor: Send + Sync {
    /// Compare events committed since the aggregate was loaded with the
    /// events it is about to save.
    ///
    /// Both sides are typed events, so a monitor can compare them by
    /// [`kind`](Event::kind) or any other part of the type hierarchy. An
    /// empty result means the save may proceed.
    fn check_for_conflicts<E: EventType + Clone>(
        &self,
        unseen: &[Event<E>],
        uncommitted: &[Event<E>],
    ) -> Vec<ConcurrencyConflict<E>>;
}

/// Treats any overlap as a conflict.
///
/// If both sides are non-empty, a single conflict bundling all unseen and all
/// uncommitted events is reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictConcurrencyMonitor;

impl ConcurrencyMonitor for StrictConcurrencyMonitor {
    fn check_for_conflicts<E: EventType + Clone>(
        &self,
        unseen: &[Event<E>],
        uncommitted: &[Event<E>],
    ) -> Vec<ConcurrencyConflict<E>> {
        if unseen.is_empty() || uncommitted.is_empty() {
            return Vec::new();
        }

        tracing::debug!(
            unseen = unseen.len(),
            uncommitted = uncommitted.len(),
            "pending changes conflict with committed events"
        );
        vec![ConcurrencyConflict {
            unseen_events: unseen.to_vec(),
            uncommitted_events: uncommitted.to_vec(),
            message: STRICT_CONFLICT_MESSAGE.to_string(),
        }]
    }
}

/// No conflict detection - last writer wins, subject to the store's
/// expected-version check.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unchecked;

impl ConcurrencyMonitor for Unchecked {
    fn check_for_conflicts<E: EventType + Clone>(
        &self,
        _unseen: &[Event<E>],
        _uncommitted: &[Event<E>],
    ) -> Vec<ConcurrencyConflict<E>> {
        Vec::new()
    }
}

/// A clash between events another writer committed and this writer's pending
/// events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyConflict<E> {
    pub unseen_events: Vec<Event<E>>,
    pub uncommitted_events: Vec<Event<E>>,
    pub message: String,
}

impl<E> fmt::Display for ConcurrencyConflict<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} unseen, {} uncommitted)",
            self.message,
            self.unseen_events.len(),
            self.uncommitted_events.len()
        )
    }
}

/// Raised when a monitor reports at least one conflict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", format_conflicts(.stream_id, .conflicts))]
pub struct ConcurrencyConflictError<E: fmt::Debug> {
    pub stream_id: String,
    pub conflicts: Vec<ConcurrencyConflict<E>>,
}

fn format_conflicts<E>(stream_id: &str, conflicts: &[ConcurrencyConflict<E>]) -> String {
    let details: Vec<String> = conflicts.iter().map(ToString::to_string).collect();
    format!(
        "concurrency conflict on stream `{stream_id}`: {} (hint: reload the aggregate and retry)",
        details.join("; ")
    )
}
