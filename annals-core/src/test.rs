//! Test utilities for event-sourced aggregates.
//!
//! This module provides testing utilities for event-sourced systems:
//!
//! - [`TestFramework`]: given/when/then unit testing for aggregates in
//!   isolation
//! - [`ContextTestExt`]: extension trait for integration tests against a real
//!   [`Context`] and store
//!
//! # Unit Testing with [`TestFramework`]
//!
//! ```ignore
//! use annals::test::TestFramework;
//!
//! #[test]
//! fn placing_an_order_records_it() {
//!     TestFramework::<SalesOrder>::given(&[])
//!         .when(&PlaceOrder { order_id: 7, customer_id: 1 })
//!         .then_expect_events(&[OrderPlaced { order_id: 7, customer_id: 1 }.into()]);
//! }
//! ```
//!
//! # Integration Testing with [`ContextTestExt`]
//!
//! ```ignore
//! use annals::test::ContextTestExt;
//!
//! // Seed history without going through command handlers
//! context.seed_events(&order_id, vec![OrderPlaced { .. }.into()]).await?;
//!
//! // Simulate another process writing after we loaded
//! let mut order = context.get(&order_id, None).await?;
//! context.inject_concurrent_event(&order_id, OrderShipped { .. }).await?;
//! ```

use std::{fmt, future::Future};

use serde::Serialize;
use thiserror::Error;

use crate::{
    aggregate::{Aggregate, AggregateRoot, Handle},
    chain::EventChain,
    context::Context,
    event::{INITIAL_VERSION, Version},
    store::{AppendError, EventStore},
};

// =============================================================================
// Context Test Extension Trait
// =============================================================================

/// Error type for seeding operations.
#[derive(Debug, Error)]
pub enum SeedError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    #[error("failed to read stream version: {0}")]
    Version(#[source] StoreError),
    #[error("failed to persist event: {0}")]
    Append(#[source] AppendError<StoreError>),
}

type SeedResult<S> = Result<Version, SeedError<<S as EventStore>::Error>>;

/// Extension trait providing test utilities for [`Context`].
///
/// Events are written straight to the store, bypassing command handlers and
/// conflict detection, and numbered to continue the stream.
pub trait ContextTestExt<A: Aggregate> {
    type Store: EventStore;

    /// Append events to an aggregate's stream, continuing from its current
    /// version.
    ///
    /// Returns the version of the last event written.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError`] if the store fails.
    fn seed_events<'a>(
        &'a self,
        id: &'a A::Id,
        events: Vec<A::Event>,
    ) -> impl Future<Output = SeedResult<Self::Store>> + Send + 'a
    where
        A::Event: Serialize + Send + 'a;

    /// Append a single event as if from a concurrent writer.
    ///
    /// Use this between loading an aggregate and saving it to exercise
    /// conflict detection.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError`] if the store fails.
    fn inject_concurrent_event<'a>(
        &'a self,
        id: &'a A::Id,
        event: impl Into<A::Event>,
    ) -> impl Future<Output = SeedResult<Self::Store>> + Send + 'a
    where
        A::Event: Serialize + Send + 'a,
    {
        self.seed_events(id, vec![event.into()])
    }
}

impl<A, S, M, P> ContextTestExt<A> for Context<A, S, M, P>
where
    A: Aggregate,
    A::Id: Sync,
    S: EventStore,
    M: Sync,
    P: Sync,
{
    type Store = S;

    fn seed_events<'a>(
        &'a self,
        id: &'a A::Id,
        events: Vec<A::Event>,
    ) -> impl Future<Output = SeedResult<Self::Store>> + Send + 'a
    where
        A::Event: Serialize + Send + 'a,
    {
        async move {
            let stream_id = self.stream_id(id);
            let current = self
                .event_store()
                .stream_version(&stream_id)
                .await
                .map_err(SeedError::Version)?
                .unwrap_or(INITIAL_VERSION);

            let mut chain = EventChain::<A::Event>::continuing_from(current);
            for event in events {
                chain.push(event);
            }
            let last_version = chain.last_version();

            self.event_store()
                .save(&stream_id, current, chain.into_vec())
                .await
                .map_err(SeedError::Append)?;
            tracing::trace!(%stream_id, last_version, "seeded events");
            Ok(last_version)
        }
    }
}

// =============================================================================
// Test Framework for Aggregate Unit Testing
// =============================================================================

/// Test executor for aggregate testing using a given-when-then pattern.
///
/// This allows testing aggregate behavior without persistence,
/// focusing on the pure command handling logic. Previous events are replayed
/// through the real kernel, so apply-handler registration is exercised too.
pub struct TestFramework<A: Aggregate> {
    aggregate: AggregateRoot<A>,
}

impl<A: Aggregate> TestFramework<A> {
    /// Start a test scenario with previous events already applied.
    ///
    /// Pass an empty slice `&[]` to test with no previous events.
    ///
    /// # Panics
    ///
    /// Panics if an event cannot be applied to the aggregate.
    #[must_use]
    #[track_caller]
    pub fn given(events: &[A::Event]) -> Self
    where
        A::Event: Clone,
    {
        Self {
            aggregate: AggregateRoot::new(),
        }
        .and(events.to_vec())
    }

    /// Add more events to the aggregate state before executing the command.
    ///
    /// # Panics
    ///
    /// Panics if an event cannot be applied to the aggregate.
    #[must_use]
    #[track_caller]
    pub fn and(mut self, events: Vec<A::Event>) -> Self {
        let mut chain = EventChain::continuing_from(self.aggregate.version());
        for event in events {
            chain.push(event);
        }
        if let Err(error) = self.aggregate.apply_all(&chain) {
            panic!("Given events could not be applied: {error}");
        }
        self
    }

    /// Execute a command against the aggregate.
    ///
    /// Returns a `TestResult` that can be used to verify the outcome.
    #[must_use]
    pub fn when<C>(self, command: &C) -> TestResult<A>
    where
        A: Handle<C>,
    {
        let result = self.aggregate.state().handle(command);
        TestResult { result }
    }

    /// The aggregate as rebuilt from the given events.
    #[must_use]
    pub const fn aggregate(&self) -> &AggregateRoot<A> {
        &self.aggregate
    }
}

/// Result of executing a command, ready for assertions.
pub struct TestResult<A: Aggregate> {
    result: Result<Vec<A::Event>, A::Error>,
}

impl<A: Aggregate> TestResult<A> {
    /// Assert that the command produced exactly the expected events.
    ///
    /// # Panics
    ///
    /// Panics if the command returned an error or the events don't match.
    #[track_caller]
    pub fn then_expect_events(self, expected: &[A::Event])
    where
        A::Event: PartialEq + fmt::Debug,
        A::Error: fmt::Debug,
    {
        match self.result {
            Ok(events) => {
                assert_eq!(
                    events, expected,
                    "Expected events did not match actual events"
                );
            }
            Err(error) => {
                panic!("Expected events but got error: {error:?}");
            }
        }
    }

    /// Assert that the command produced no events.
    ///
    /// # Panics
    ///
    /// Panics if the command returned an error or produced any events.
    #[track_caller]
    pub fn then_expect_no_events(self)
    where
        A::Event: fmt::Debug,
        A::Error: fmt::Debug,
    {
        match self.result {
            Ok(events) => {
                assert!(events.is_empty(), "Expected no events but got: {events:?}");
            }
            Err(error) => {
                panic!("Expected no events but got error: {error:?}");
            }
        }
    }

    /// Assert that the command returned an error.
    ///
    /// # Panics
    ///
    /// Panics if the command succeeded.
    #[track_caller]
    pub fn then_expect_error(self)
    where
        A::Event: fmt::Debug,
    {
        if let Ok(events) = self.result {
            panic!("Expected error but got events: {events:?}");
        }
    }

    /// Assert that the command returned an error containing the given message.
    ///
    /// # Panics
    ///
    /// Panics if the command succeeded or the message doesn't match.
    #[track_caller]
    pub fn then_expect_error_message(self, expected_substring: &str)
    where
        A::Event: fmt::Debug,
        A::Error: fmt::Display,
    {
        match self.result {
            Ok(events) => {
                panic!("Expected error but got events: {events:?}");
            }
            Err(error) => {
                let error_msg = error.to_string();
                assert!(
                    error_msg.contains(expected_substring),
                    "Expected error message to contain '{expected_substring}' but got: {error_msg}"
                );
            }
        }
    }

    /// Get the raw result for custom assertions.
    ///
    /// # Errors
    ///
    /// Returns any command handling error produced by the aggregate.
    pub fn inspect_result(self) -> Result<Vec<A::Event>, A::Error> {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::{
        concurrency::StrictConcurrencyMonitor, dispatch::ApplyHandlers, event::EventType,
        store::inmemory,
    };

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    enum CounterEvent {
        Opened { counter_id: String },
        Added { amount: i32 },
        Subtracted { amount: i32 },
    }

    impl EventType for CounterEvent {
        fn kind(&self) -> &'static str {
            match self {
                Self::Opened { .. } => "counter-opened",
                Self::Added { .. } => "value-added",
                Self::Subtracted { .. } => "value-subtracted",
            }
        }
    }

    #[derive(Debug, Default)]
    struct Counter {
        id: Option<String>,
        value: i32,
    }

    impl Counter {
        fn apply_event(&mut self, event: &CounterEvent) {
            match event {
                CounterEvent::Opened { counter_id } => self.id = Some(counter_id.clone()),
                CounterEvent::Added { amount } => self.value += amount,
                CounterEvent::Subtracted { amount } => self.value -= amount,
            }
        }
    }

    impl Aggregate for Counter {
        type Error = String;
        type Event = CounterEvent;
        type Id = String;

        const KIND: &'static str = "counter";

        fn id(&self) -> Option<&Self::Id> {
            self.id.as_ref()
        }

        fn register_handlers(handlers: &mut ApplyHandlers<Self>) {
            handlers
                .on("counter-opened", Self::apply_event)
                .on("value-added", Self::apply_event)
                .on("value-subtracted", Self::apply_event);
        }
    }

    struct AddValue {
        amount: i32,
    }

    struct SubtractValue {
        amount: i32,
    }

    struct NoOp;

    impl Handle<AddValue> for Counter {
        fn handle(&self, command: &AddValue) -> Result<Vec<Self::Event>, Self::Error> {
            if command.amount <= 0 {
                return Err("amount must be positive".to_string());
            }
            Ok(vec![CounterEvent::Added {
                amount: command.amount,
            }])
        }
    }

    impl Handle<SubtractValue> for Counter {
        fn handle(&self, command: &SubtractValue) -> Result<Vec<Self::Event>, Self::Error> {
            if self.value < command.amount {
                return Err("insufficient value".to_string());
            }
            Ok(vec![CounterEvent::Subtracted {
                amount: command.amount,
            }])
        }
    }

    impl Handle<NoOp> for Counter {
        fn handle(&self, _: &NoOp) -> Result<Vec<Self::Event>, Self::Error> {
            Ok(vec![])
        }
    }

    type CounterTest = TestFramework<Counter>;

    fn opened() -> CounterEvent {
        CounterEvent::Opened {
            counter_id: "c-1".to_string(),
        }
    }

    #[test]
    fn given_no_events_when_add_then_produces_event() {
        CounterTest::given(&[])
            .when(&AddValue { amount: 10 })
            .then_expect_events(&[CounterEvent::Added { amount: 10 }]);
    }

    #[test]
    fn given_events_and_more_events_when_subtract() {
        CounterTest::given(&[opened(), CounterEvent::Added { amount: 10 }])
            .and(vec![CounterEvent::Added { amount: 5 }])
            .when(&SubtractValue { amount: 12 })
            .then_expect_events(&[CounterEvent::Subtracted { amount: 12 }]);
    }

    #[test]
    fn given_events_are_versioned_from_zero() {
        let test = CounterTest::given(&[opened(), CounterEvent::Added { amount: 1 }])
            .and(vec![CounterEvent::Added { amount: 1 }]);
        assert_eq!(test.aggregate().version(), 2);
        assert_eq!(test.aggregate().state().value, 2);
    }

    #[test]
    fn given_insufficient_balance_when_subtract_then_error_message() {
        CounterTest::given(&[opened(), CounterEvent::Added { amount: 10 }])
            .when(&SubtractValue { amount: 20 })
            .then_expect_error_message("insufficient value");
    }

    #[test]
    fn invalid_command_returns_error() {
        CounterTest::given(&[])
            .when(&AddValue { amount: -5 })
            .then_expect_error();
    }

    #[test]
    fn no_op_command_produces_no_events() {
        CounterTest::given(&[]).when(&NoOp).then_expect_no_events();
    }

    #[test]
    fn inspect_result_returns_raw_result() {
        let events = CounterTest::given(&[])
            .when(&AddValue { amount: 10 })
            .inspect_result()
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn seeded_events_continue_the_stream() {
        let context: Context<Counter, inmemory::Store, StrictConcurrencyMonitor> =
            Context::new(inmemory::Store::new());
        let id = "c-1".to_string();

        let last = context
            .seed_events(&id, vec![opened(), CounterEvent::Added { amount: 3 }])
            .await
            .unwrap();
        assert_eq!(last, 1);

        let last = context
            .inject_concurrent_event(&id, CounterEvent::Added { amount: 4 })
            .await
            .unwrap();
        assert_eq!(last, 2);

        let counter = context.get(&id, None).await.unwrap();
        assert_eq!(counter.version(), 2);
        assert_eq!(counter.state().value, 7);
        assert_eq!(counter.id(), Some(&id));
    }
}
