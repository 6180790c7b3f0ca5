//! Unit of work around one aggregate type.
//!
//! `Context` loads aggregates from an [`EventStore`], checks pending changes
//! against events committed in the meantime, saves them, and hands the saved
//! events to an [`EventPublisher`].
//!
//! ```ignore
//! let context = Context::<SalesOrder, _>::new(inmemory::Store::new());
//!
//! let mut order = context.get(&order_id, None).await?;
//! order.handle(&AddLine { sku, quantity })?;
//! context.save_and_publish_events(&mut order).await?;
//! ```

use std::{fmt, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{
    aggregate::{Aggregate, AggregateError, AggregateRoot, Handle, HandleError},
    concurrency::{ConcurrencyConflictError, ConcurrencyMonitor, StrictConcurrencyMonitor},
    config::Conventions,
    dispatch::ApplyHandlers,
    event::{Event, Version},
    publish::{EventPublisher, NoPublisher},
    store::{
        AppendError, ConcurrencyViolation, EventStore, EventStream, LoadError, NonContiguousBatch,
    },
};

/// Error from [`Context::get`].
#[derive(Debug, Error)]
pub enum GetError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    #[error("failed to load aggregate events: {0}")]
    Load(#[source] LoadError<StoreError>),
    #[error("failed to rebuild aggregate state: {0}")]
    Replay(#[source] AggregateError),
}

/// Error from [`Context::save_and_publish_events`].
#[derive(Debug, Error)]
pub enum SaveError<E, StoreError, PublishError>
where
    E: fmt::Debug,
    StoreError: std::error::Error + 'static,
    PublishError: std::error::Error + 'static,
{
    /// The monitor found events committed since the aggregate was loaded.
    /// Nothing was written.
    #[error(transparent)]
    Conflict(ConcurrencyConflictError<E>),
    /// The store rejected the write because the stream moved on.
    #[error(transparent)]
    Violation(ConcurrencyViolation),
    /// The store refused a batch numbered out of sequence. Reloading does not
    /// help.
    #[error(transparent)]
    NonContiguous(NonContiguousBatch),
    #[error("failed to load unseen events: {0}")]
    Load(#[source] LoadError<StoreError>),
    #[error("failed to persist events: {0}")]
    Store(#[source] StoreError),
    /// The events are saved; only their delivery failed.
    #[error("events were saved but could not be published: {0}")]
    Publication(#[source] PublishError),
}

impl<E, StoreError, PublishError> SaveError<E, StoreError, PublishError>
where
    E: fmt::Debug,
    StoreError: std::error::Error + 'static,
    PublishError: std::error::Error + 'static,
{
    /// Whether reloading the aggregate and trying again may succeed.
    #[must_use]
    pub const fn is_concurrency_error(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Violation(_))
    }
}

/// Error from [`Context::execute`] and [`Context::execute_with_retry`].
#[derive(Debug, Error)]
pub enum CommandError<AggregateRejection, E, StoreError, PublishError>
where
    E: fmt::Debug,
    StoreError: std::error::Error + 'static,
    PublishError: std::error::Error + 'static,
{
    #[error("aggregate rejected command: {0}")]
    Rejected(AggregateRejection),
    #[error(transparent)]
    Get(GetError<StoreError>),
    #[error(transparent)]
    Kernel(AggregateError),
    #[error(transparent)]
    Save(SaveError<E, StoreError, PublishError>),
}

impl<AggregateRejection, E, StoreError, PublishError>
    CommandError<AggregateRejection, E, StoreError, PublishError>
where
    E: fmt::Debug,
    StoreError: std::error::Error + 'static,
    PublishError: std::error::Error + 'static,
{
    /// Whether reloading the aggregate and trying again may succeed.
    #[must_use]
    pub const fn is_concurrency_error(&self) -> bool {
        matches!(self, Self::Save(e) if e.is_concurrency_error())
    }
}

/// Result type alias for [`Context::save_and_publish_events`].
pub type SaveResult<A, S, P> = Result<
    (),
    SaveError<
        <A as Aggregate>::Event,
        <S as EventStore>::Error,
        <P as EventPublisher<<A as Aggregate>::Event>>::Error,
    >,
>;

/// Result type alias for command execution, yielding a count.
pub type CommandResult<A, S, P> = Result<
    usize,
    CommandError<
        <A as Aggregate>::Error,
        <A as Aggregate>::Event,
        <S as EventStore>::Error,
        <P as EventPublisher<<A as Aggregate>::Event>>::Error,
    >,
>;

/// Unit of work for aggregates of type `A` stored in `S`.
pub struct Context<A, S, M = StrictConcurrencyMonitor, P = NoPublisher>
where
    A: Aggregate,
    S: EventStore,
{
    store: S,
    monitor: M,
    publisher: P,
    conventions: Conventions,
    handlers: Arc<ApplyHandlers<A>>,
}

impl<A, S> Context<A, S>
where
    A: Aggregate,
    S: EventStore,
{
    /// Create a context with strict conflict detection, no publisher and
    /// default conventions.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            monitor: StrictConcurrencyMonitor,
            publisher: NoPublisher,
            conventions: Conventions::default(),
            handlers: Arc::new(ApplyHandlers::for_aggregate()),
        }
    }
}

impl<A, S, M, P> Context<A, S, M, P>
where
    A: Aggregate,
    S: EventStore,
{
    #[must_use]
    pub fn with_monitor<M2>(self, monitor: M2) -> Context<A, S, M2, P>
    where
        M2: ConcurrencyMonitor,
    {
        Context {
            store: self.store,
            monitor,
            publisher: self.publisher,
            conventions: self.conventions,
            handlers: self.handlers,
        }
    }

    #[must_use]
    pub fn with_publisher<P2>(self, publisher: P2) -> Context<A, S, M, P2>
    where
        P2: EventPublisher<A::Event>,
    {
        Context {
            store: self.store,
            monitor: self.monitor,
            publisher,
            conventions: self.conventions,
            handlers: self.handlers,
        }
    }

    #[must_use]
    pub fn with_conventions(mut self, conventions: Conventions) -> Self {
        self.conventions = conventions;
        self
    }

    #[must_use]
    pub const fn event_store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn publisher(&self) -> &P {
        &self.publisher
    }

    #[must_use]
    pub const fn conventions(&self) -> &Conventions {
        &self.conventions
    }

    /// A fresh aggregate sharing this context's handler table and
    /// conventions.
    #[must_use]
    pub fn create(&self) -> AggregateRoot<A> {
        AggregateRoot::with_handlers(Arc::clone(&self.handlers), &self.conventions)
    }

    #[must_use]
    pub fn stream_id(&self, id: &A::Id) -> String {
        self.conventions.stream_id(A::KIND, id)
    }

    /// Load an aggregate by replaying its stream, optionally only up to
    /// `expected_version`.
    ///
    /// An id that was never written yields a fresh aggregate with no
    /// identity.
    ///
    /// # Errors
    ///
    /// Returns [`GetError::Load`] if the store fails or `expected_version`
    /// is not in the stream, or [`GetError::Replay`] if an event cannot be
    /// applied.
    #[tracing::instrument(skip(self), fields(aggregate = A::KIND))]
    pub async fn get(
        &self,
        id: &A::Id,
        expected_version: Option<Version>,
    ) -> Result<AggregateRoot<A>, GetError<S::Error>>
    where
        A::Event: DeserializeOwned + Send,
    {
        let stream_id = self.stream_id(id);
        let stream: EventStream<A::Event> = self
            .store
            .load(&stream_id, expected_version)
            .await
            .map_err(GetError::Load)?;

        let mut aggregate = self.create();
        aggregate.apply_all(&stream).map_err(GetError::Replay)?;
        tracing::debug!(
            %stream_id,
            version = aggregate.version(),
            replayed = stream.len(),
            "aggregate loaded"
        );
        Ok(aggregate)
    }
}

impl<A, S, M, P> Context<A, S, M, P>
where
    A: Aggregate,
    A::Event: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync,
    S: EventStore,
    M: ConcurrencyMonitor,
    P: EventPublisher<A::Event>,
{
    /// Persist the aggregate's uncommitted events, then publish them.
    ///
    /// Events committed to the stream after the aggregate's base version are
    /// checked against the pending events first; a conflict aborts before
    /// anything is written. On success the aggregate's pending events are
    /// accepted before publication, so a publisher failure leaves the save in
    /// place.
    ///
    /// # Errors
    ///
    /// See [`SaveError`] for the failure modes.
    pub async fn save_and_publish_events(
        &self,
        aggregate: &mut AggregateRoot<A>,
    ) -> SaveResult<A, S, P> {
        let uncommitted = aggregate.uncommitted_events();
        let Some(id) = aggregate.id().filter(|_| !uncommitted.is_empty()) else {
            aggregate.accept_uncommitted_events();
            return Ok(());
        };

        let stream_id = self.stream_id(id);
        let base_version = aggregate.base_version();
        tracing::debug!(
            aggregate = A::KIND,
            id = %id,
            base_version,
            version = aggregate.version(),
            pending = uncommitted.len(),
            "saving aggregate"
        );

        let unseen = self.unseen_events(&stream_id, base_version).await?;
        let conflicts = self.monitor.check_for_conflicts(&unseen, &uncommitted);
        if !conflicts.is_empty() {
            tracing::debug!(
                %stream_id,
                unseen = unseen.len(),
                "conflicting events committed since load; not saving"
            );
            return Err(SaveError::Conflict(ConcurrencyConflictError {
                stream_id,
                conflicts,
            }));
        }

        self.store
            .save(&stream_id, base_version, uncommitted.clone())
            .await
            .map_err(|e| match e {
                AppendError::Conflict(violation) => SaveError::Violation(violation),
                AppendError::NonContiguous(batch) => SaveError::NonContiguous(batch),
                AppendError::Store(e) => SaveError::Store(e),
            })?;
        aggregate.accept_uncommitted_events();

        self.publisher
            .publish(&stream_id, &uncommitted)
            .await
            .map_err(SaveError::Publication)?;
        tracing::debug!(%stream_id, published = uncommitted.len(), "events published");
        Ok(())
    }

    async fn unseen_events(
        &self,
        stream_id: &str,
        base_version: Version,
    ) -> Result<Vec<Event<A::Event>>, SaveError<A::Event, S::Error, P::Error>> {
        let committed: EventStream<A::Event> = self
            .store
            .load(stream_id, None)
            .await
            .map_err(SaveError::Load)?;
        Ok(committed
            .into_iter()
            .filter(|event| event.version() > base_version)
            .collect())
    }

    /// Load the aggregate, run `command` against it, and save the resulting
    /// events.
    ///
    /// Returns the number of events recorded.
    ///
    /// # Errors
    ///
    /// See [`CommandError`] for the failure modes.
    pub async fn execute<C>(&self, id: &A::Id, command: &C) -> CommandResult<A, S, P>
    where
        A: Handle<C>,
    {
        let mut aggregate = self.get(id, None).await.map_err(CommandError::Get)?;
        let recorded = aggregate.handle(command).map_err(|e| match e {
            HandleError::Rejected(rejection) => CommandError::Rejected(rejection),
            HandleError::Kernel(e) => CommandError::Kernel(e),
        })?;
        self.save_and_publish_events(&mut aggregate)
            .await
            .map_err(CommandError::Save)?;
        Ok(recorded)
    }

    /// Execute a command, reloading and retrying on concurrency errors.
    ///
    /// Returns the number of attempts it took.
    ///
    /// # Errors
    ///
    /// Returns the last error if all retries are exhausted, or any other
    /// error immediately.
    pub async fn execute_with_retry<C>(
        &self,
        id: &A::Id,
        command: &C,
        max_retries: usize,
    ) -> CommandResult<A, S, P>
    where
        A: Handle<C>,
    {
        for attempt in 1..=max_retries {
            match self.execute(id, command).await {
                Ok(_) => return Ok(attempt),
                Err(e) if e.is_concurrency_error() => {
                    tracing::debug!(
                        aggregate = A::KIND,
                        id = %id,
                        attempt,
                        "retrying after concurrency error"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        self.execute(id, command).await.map(|_| max_retries + 1)
    }
}

#[cfg(test)]
mod tests {
    use std::{convert::Infallible, error::Error, io};

    use super::*;

    type TestSaveError = SaveError<String, io::Error, Infallible>;

    #[test]
    fn get_error_replay_has_source() {
        let error: GetError<io::Error> = GetError::Replay(AggregateError::MissingApplyHandler {
            aggregate: "customer",
            event: "renamed",
        });
        assert!(error.to_string().contains("rebuild aggregate state"));
        assert!(error.source().is_some());
    }

    #[test]
    fn save_error_classifies_concurrency() {
        let violation: TestSaveError = SaveError::Violation(ConcurrencyViolation {
            stream_id: "customer-1".to_string(),
            expected: 1,
            actual: Some(2),
        });
        assert!(violation.is_concurrency_error());
        assert!(violation.to_string().contains("reload and retry"));

        let conflict: TestSaveError = SaveError::Conflict(ConcurrencyConflictError {
            stream_id: "customer-1".to_string(),
            conflicts: Vec::new(),
        });
        assert!(conflict.is_concurrency_error());

        let store: TestSaveError = SaveError::Store(io::Error::other("disk full"));
        assert!(!store.is_concurrency_error());
        assert!(store.source().is_some());
    }

    #[test]
    fn non_contiguous_batch_is_not_retried() {
        let error: TestSaveError = SaveError::NonContiguous(NonContiguousBatch {
            stream_id: "customer-1".to_string(),
            expected_version: 3,
            position: 0,
            expected: 4,
            found: 1,
        });
        assert!(!error.is_concurrency_error());
        assert!(error.to_string().contains("does not continue from version 3"));
    }

    #[test]
    fn publication_error_says_events_were_saved() {
        let error: SaveError<String, io::Error, io::Error> =
            SaveError::Publication(io::Error::other("broker down"));
        assert!(error.to_string().contains("events were saved"));
        assert!(!error.is_concurrency_error());
    }

    #[test]
    fn command_error_display_mentions_aggregate() {
        let error: CommandError<String, String, io::Error, Infallible> =
            CommandError::Rejected("order already shipped".to_string());
        let msg = error.to_string();
        assert!(msg.contains("aggregate rejected command"));
        assert!(error.source().is_none());
        assert!(!error.is_concurrency_error());
    }
}
