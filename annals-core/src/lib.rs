//! Core traits and types for the annals event-sourcing library.
//!
//! This crate provides the foundational abstractions for event sourcing:
//!
//! - [`event`] - Versioned events and their type identity (`Event`, `DomainEvent`, `EventType`)
//! - [`chain`] - Ordered event buffers with sequential versions (`EventChain`)
//! - [`aggregate`] - The aggregate kernel (`Aggregate`, `Apply`, `Handle`, `AggregateRoot`)
//! - [`dispatch`] - Apply-handler registry walked over the event type hierarchy
//! - [`concurrency`] - Conflict detection before saving (`ConcurrencyMonitor`)
//! - [`store`] - Event persistence abstraction (`EventStore`, `EventStream`)
//! - [`publish`] - Delivery of committed events (`EventPublisher`)
//! - [`config`] - Policy switches (`Conventions`)
//! - [`context`] - Load, save and publish as one unit of work (`Context`)
//!
//! # Example
//!
//! ```
//! use annals_core::{chain::EventChain, store::inmemory};
//!
//! // Create an in-memory store and a history to seed it with
//! let store = inmemory::Store::new();
//! let history = EventChain::<String>::new().add("opened").add("renamed");
//! assert_eq!(history.last_version(), 2);
//! # drop(store);
//! ```
//!
//! Most users should depend on the [`annals`](https://docs.rs/annals) crate,
//! which re-exports these types together with the derive macros.

pub mod aggregate;
pub mod chain;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod event;
pub mod publish;
pub mod store;

// Test utilities module: public when feature enabled, internal for crate tests
#[cfg(feature = "test-util")]
pub mod test;

#[cfg(all(test, not(feature = "test-util")))]
pub(crate) mod test;
