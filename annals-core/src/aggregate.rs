//! Command-side domain primitives.
//!
//! Domain state lives in a user type implementing [`Aggregate`]. The kernel,
//! [`AggregateRoot`], wraps that state and owns everything event sourcing
//! needs around it: versioning, recording new events, replaying history, and
//! tracking events that have not been persisted yet.

use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::{
    config::Conventions,
    dispatch::{ApplyHandlers, DispatchCache},
    event::{Event, EventType, INITIAL_VERSION, Version},
};

/// Entities whose state is derived entirely from their event history.
///
/// The derive macro generates the event enum and the handler registration
/// from your `Apply<E>` implementations, keeping the state struct focused on
/// domain behaviour.
pub trait Aggregate: Default + Sized {
    /// Aggregate type identifier, combined with the aggregate ID to form
    /// stream identifiers. Use lowercase kebab-case: `"sales-order"`.
    const KIND: &'static str;

    type Event: EventType;
    type Error;
    type Id: Clone + fmt::Debug + fmt::Display;

    /// Identity of this instance, once an event handler has assigned one.
    fn id(&self) -> Option<&Self::Id>;

    /// Register apply handlers for every event type identity this aggregate
    /// reacts to. Runs once per handler table.
    fn register_handlers(handlers: &mut ApplyHandlers<Self>);
}

/// Mutate an aggregate with a domain event.
///
/// ```ignore
/// impl Apply<CustomerSignedUp> for Customer {
///     fn apply(&mut self, event: &CustomerSignedUp) {
///         self.id = Some(event.customer_id);
///     }
/// }
/// ```
pub trait Apply<E> {
    fn apply(&mut self, event: &E);
}

/// Entry point for command handling.
///
/// Each command type gets its own implementation, letting the aggregate
/// express validation logic in a strongly typed way.
pub trait Handle<C>: Aggregate {
    /// Handle a command and produce events.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the command is invalid for the current
    /// aggregate state.
    fn handle(&self, command: &C) -> Result<Vec<Self::Event>, Self::Error>;
}

/// Failures raised by the kernel itself while applying events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// An event was recorded but the aggregate still has no identity.
    #[error(
        "aggregate `{aggregate}` has no identity after applying `{event}` (hint: the handler for \
         the first recorded event must assign one)"
    )]
    IdentityNotSet {
        aggregate: &'static str,
        event: &'static str,
    },
    /// Nothing in the aggregate handles the event or any of its supertypes.
    #[error(
        "aggregate `{aggregate}` has no apply handler for `{event}` or any of its supertypes \
         (hint: register one, or relax `aggregates_must_implement_apply_handlers`)"
    )]
    MissingApplyHandler {
        aggregate: &'static str,
        event: &'static str,
    },
}

/// Error from [`AggregateRoot::handle`].
#[derive(Debug, Error)]
pub enum HandleError<AggregateRejection> {
    #[error("aggregate rejected command: {0}")]
    Rejected(AggregateRejection),
    #[error(transparent)]
    Kernel(#[from] AggregateError),
}

/// Event-sourcing kernel wrapped around an aggregate's domain state.
pub struct AggregateRoot<A: Aggregate> {
    state: A,
    base_version: Version,
    version: Version,
    uncommitted: Vec<Event<A::Event>>,
    handlers: Arc<ApplyHandlers<A>>,
    dispatch: DispatchCache<A>,
    strict: bool,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// Create a fresh aggregate with its own handler table and default
    /// conventions.
    #[must_use]
    pub fn new() -> Self {
        Self::with_handlers(
            Arc::new(ApplyHandlers::for_aggregate()),
            &Conventions::default(),
        )
    }

    /// Create a fresh aggregate sharing an existing handler table.
    #[must_use]
    pub fn with_handlers(handlers: Arc<ApplyHandlers<A>>, conventions: &Conventions) -> Self {
        Self {
            state: A::default(),
            base_version: INITIAL_VERSION,
            version: INITIAL_VERSION,
            uncommitted: Vec::new(),
            handlers,
            dispatch: DispatchCache::new(),
            strict: conventions.must_implement_apply_handlers(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<&A::Id> {
        self.state.id()
    }

    /// Version as last loaded from or saved to the store.
    #[must_use]
    pub const fn base_version(&self) -> Version {
        self.base_version
    }

    /// Version including events not yet committed.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub const fn state(&self) -> &A {
        &self.state
    }

    /// Whether nothing has ever been applied to this aggregate.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.version == INITIAL_VERSION
    }

    #[must_use]
    pub fn has_uncommitted_events(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    /// Record a new event: assign the next version, apply it, and keep it as
    /// uncommitted.
    ///
    /// Returns the version assigned to the event.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::MissingApplyHandler`] if the event cannot be
    /// dispatched, leaving the aggregate untouched, or
    /// [`AggregateError::IdentityNotSet`] if the aggregate has no identity
    /// after applying it. In the latter case the event is discarded but its
    /// handlers have already run, so the instance should be dropped.
    pub fn record(&mut self, event: impl Into<A::Event>) -> Result<Version, AggregateError> {
        let event = Event::new(self.version + 1, event.into());
        tracing::debug!(
            aggregate = A::KIND,
            id = ?self.state.id(),
            base_version = self.base_version,
            version = self.version,
            event = event.kind(),
            "recording new event"
        );

        let previous_version = self.version;
        self.apply_event(&event)?;

        if self.state.id().is_none() {
            self.version = previous_version;
            return Err(AggregateError::IdentityNotSet {
                aggregate: A::KIND,
                event: event.kind(),
            });
        }

        let version = event.version();
        self.uncommitted.push(event);
        Ok(version)
    }

    /// Replay persisted events, in ascending version order, without marking
    /// them as uncommitted.
    ///
    /// Ordering is the caller's responsibility; events are applied exactly
    /// as given.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::MissingApplyHandler`] if an event cannot be
    /// dispatched. Events before it remain applied.
    pub fn apply_all<'a, I>(&mut self, events: I) -> Result<(), AggregateError>
    where
        I: IntoIterator<Item = &'a Event<A::Event>>,
        A::Event: 'a,
    {
        let mut applied = 0_usize;
        for event in events {
            self.apply_event(event)?;
            applied += 1;
        }

        self.base_version = self.version;
        tracing::debug!(
            aggregate = A::KIND,
            id = ?self.state.id(),
            base_version = self.base_version,
            version = self.version,
            applied,
            "applied historical events"
        );
        Ok(())
    }

    /// Snapshot of the events recorded since the last accept.
    #[must_use]
    pub fn uncommitted_events(&self) -> Vec<Event<A::Event>>
    where
        A::Event: Clone,
    {
        self.uncommitted.clone()
    }

    /// Mark pending events as committed after a successful save.
    pub fn accept_uncommitted_events(&mut self) {
        if self.uncommitted.is_empty() {
            tracing::debug!(
                aggregate = A::KIND,
                id = ?self.state.id(),
                version = self.version,
                "no uncommitted events to accept"
            );
            return;
        }

        let accepted = self.uncommitted.len();
        self.uncommitted.clear();
        self.base_version = self.version;
        tracing::debug!(
            aggregate = A::KIND,
            id = ?self.state.id(),
            base_version = self.base_version,
            accepted,
            "accepted uncommitted events"
        );
    }

    /// Run a command against the current state and record every event it
    /// produces.
    ///
    /// Returns the number of events recorded.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Rejected`] if the aggregate rejects the command,
    /// or [`HandleError::Kernel`] if recording one of its events fails.
    ///
    /// A kernel failure partway through a batch (for example
    /// [`AggregateError::MissingApplyHandler`] on the second event) leaves the
    /// events before it recorded and applied. The instance no longer matches
    /// any consistent outcome of the command: drop it and reload rather than
    /// saving it.
    pub fn handle<C>(&mut self, command: &C) -> Result<usize, HandleError<A::Error>>
    where
        A: Handle<C>,
    {
        let events = self.state.handle(command).map_err(HandleError::Rejected)?;
        let count = events.len();
        for event in events {
            self.record(event)?;
        }
        Ok(count)
    }

    fn apply_event(&mut self, event: &Event<A::Event>) -> Result<(), AggregateError> {
        let handlers = self
            .dispatch
            .resolve(&self.handlers, event.payload(), self.strict)?;

        tracing::trace!(
            aggregate = A::KIND,
            event = event.kind(),
            version = event.version(),
            handler_count = handlers.len(),
            "applying event"
        );
        for handler in handlers {
            handler(&mut self.state, event.payload());
        }

        self.version = event.version();
        Ok(())
    }
}

impl<A: Aggregate> Default for AggregateRoot<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for AggregateRoot<A>
where
    A: Aggregate + fmt::Debug,
    A::Event: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRoot")
            .field("kind", &A::KIND)
            .field("state", &self.state)
            .field("base_version", &self.base_version)
            .field("version", &self.version)
            .field("uncommitted", &self.uncommitted)
            .finish_non_exhaustive()
    }
}
