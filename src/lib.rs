#![doc = include_str!("../README.md")]

#[cfg(feature = "test-util")]
pub use annals_core::test;
pub use annals_core::{
    aggregate,
    aggregate::{Aggregate, AggregateError, AggregateRoot, Apply, Handle, HandleError},
    chain,
    chain::EventChain,
    concurrency,
    concurrency::{ConcurrencyMonitor, StrictConcurrencyMonitor},
    config,
    config::{Conventions, StreamNaming},
    context,
    context::{CommandError, Context, GetError, SaveError},
    dispatch,
    event,
    event::{DomainEvent, Event, EventType, INITIAL_VERSION, Version},
    publish,
    publish::EventPublisher,
};
// Re-export proc macro derives so consumers only depend on `annals`.
pub use annals_macros::{Aggregate, DomainEvent};

pub mod store {

    pub use annals_core::store::{
        ConcurrencyViolation, EventStore, EventStream, LoadError, NonContiguousBatch, NonEmpty,
        VersionOutOfRange,
    };

    // Low-level append types for EventStore implementors.
    // Most users should go through the Context instead.
    #[doc(hidden)]
    pub use annals_core::store::{AppendError, ensure_contiguous, expected_version_matches};

    pub use annals_core::store::inmemory;
}
